use drivefs_config::DriveFsConfig;

pub fn run(config: &DriveFsConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Print as YAML for readability
    let yaml = config.effective().to_yaml()?;
    println!("{}", yaml);

    Ok(())
}
