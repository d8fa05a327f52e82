fn main() -> anyhow::Result<()> {
    pagesound_lib::run()
}
