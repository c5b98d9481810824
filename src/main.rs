use anyhow::Context;

use stow::{settings, Allocator, PalletInput};

fn main() -> anyhow::Result<()> {
    stow::logging::init();

    let path = std::env::args()
        .nth(1)
        .context("用法: stow <input.json>")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("無法讀取 {}", path))?;
    let inputs: Vec<PalletInput> =
        serde_json::from_str(&raw).with_context(|| format!("{} 不是合法的棧板清單", path))?;

    let config = settings::config_from_env();
    let allocator = Allocator::new(config).context("配置不合法")?;
    let result = allocator.allocate(&inputs).context("配櫃失敗")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
