use crate::common::{CommandRunner, Invocation};
use anyhow::{bail, Result};
use integration_sdk::Inventory;

/// Records every loaded module (`httpd -M`) as `modules/<name>`.
pub fn parse_modules(output: &str, inventory: &mut Inventory) {
    for line in output.lines() {
        let module = line
            .split_whitespace()
            .find_map(|word| word.strip_suffix("_module"));

        if let Some(name) = module {
            inventory.set_item(format!("modules/{}", name), "value", "enabled");
        }
    }
}

/// Records the server version from the `httpd -V` build settings.
pub fn parse_version(output: &str, inventory: &mut Inventory) {
    let version = output
        .lines()
        .filter(|line| line.contains("Server version"))
        .find_map(|line| line.split_once(':'))
        .map(|(_, version)| version.trim());

    if let Some(version) = version {
        inventory.set_item("version", "value", version);
    }
}

pub async fn collect_inventory(
    runner: &dyn CommandRunner,
    binary_path: &str,
    inventory: &mut Inventory,
) -> Result<()> {
    let modules = runner.run(&Invocation::new(binary_path).arg("-M")).await?;
    parse_modules(&modules, inventory);

    let settings = runner.run(&Invocation::new(binary_path).arg("-V")).await?;
    parse_version(&settings, inventory);

    if inventory.is_empty() {
        bail!("Empty result");
    }
    Ok(())
}
