fn main() -> anyhow::Result<()> {
    vr_gallery::demo::run()
}
