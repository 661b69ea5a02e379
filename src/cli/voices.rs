//! Reference voice CLI commands.
//!
//! - `chatvoice voices list` - Show usable voices and clips missing a transcript
//! - `chatvoice voices init` - Create the reference directory with instructions

use anyhow::Result;
use clap::Subcommand;

use crate::config::paths;
use crate::voices;

/// Reference voice subcommands
#[derive(Subcommand, Debug)]
pub enum VoicesCommands {
    /// List reference voices
    List,

    /// Create the reference directory and a README describing its layout
    Init,
}

/// Execute a voices command
pub async fn execute(command: VoicesCommands) -> Result<()> {
    match command {
        VoicesCommands::List => execute_list().await,
        VoicesCommands::Init => execute_init().await,
    }
}

async fn execute_list() -> Result<()> {
    let dir = paths::reference_dir()?;
    let scan = voices::scan(&dir)?;

    println!();
    println!("Reference voices in {}", dir.display());
    println!("══════════════════════════════════════════════════════════════");
    println!();

    if scan.voices.is_empty() {
        println!("No usable reference voices. Run `chatvoice voices init` for instructions.");
    }

    for voice in &scan.voices {
        let preview: String = voice.transcript.chars().take(50).collect();
        println!("  🎙️  {:<24} \"{}\"", voice.name, preview);
    }

    if !scan.missing_transcripts.is_empty() {
        println!();
        println!("Missing transcripts (add a .txt with the spoken words):");
        for path in &scan.missing_transcripts {
            println!("  ⚠️  {}", path.display());
        }
    }
    println!();

    Ok(())
}

async fn execute_init() -> Result<()> {
    let dir = paths::reference_dir()?;
    let readme = voices::write_instructions(&dir)?;

    println!("✅ Reference directory ready: {}", dir.display());
    println!("   See {}", readme.display());
    Ok(())
}
