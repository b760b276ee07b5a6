fn main() -> Result<(), Box<dyn std::error::Error>> {
    // agent version reported in heartbeats and the CLI --version
    shadow()?;
    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}

fn shadow() -> shadow_rs::SdResult<()> {
    shadow_rs::ShadowBuilder::builder().build()?;
    Ok(())
}
