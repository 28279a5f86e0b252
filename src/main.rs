fn main() -> anyhow::Result<()> {
    mediadex_lib::run()
}
