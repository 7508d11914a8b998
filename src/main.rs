fn main() -> anyhow::Result<()> {
    smokegpt_lib::run()
}
