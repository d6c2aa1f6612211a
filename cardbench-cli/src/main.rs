fn main() -> anyhow::Result<()> {
    cardbench_cli::run()
}
