use std::{env, fs, path::PathBuf, process};

use anyhow::Context;

use autorig::{EngineConfig, StaticTierTable, rig_container};

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: autorig <input.glb> <output.glb> [plan]");
        process::exit(2);
    }

    let input = PathBuf::from(&args[1]);
    let output = PathBuf::from(&args[2]);
    let plan = args.get(3).map(String::as_str).unwrap_or("pro");

    let bytes = fs::read(&input)
        .with_context(|| format!("failed to read input file: {}", input.display()))?;

    let result = rig_container(
        &bytes,
        plan,
        &StaticTierTable::default(),
        None,
        &EngineConfig::default(),
    )?;

    fs::write(&output, &result.rigged_bytes)
        .with_context(|| format!("failed to write output: {}", output.display()))?;

    println!("Plan: {plan}");
    println!("Strategy: {:?}", result.strategy);
    println!(
        "Bones: {}, Morph targets: {}",
        result.statistics.bone_count, result.statistics.morph_count
    );
    println!(
        "Size: {} -> {} bytes ({} ms)",
        result.statistics.original_size,
        result.statistics.rigged_size,
        result.statistics.processing_time_ms
    );

    Ok(())
}
