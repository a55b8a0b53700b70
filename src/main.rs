// Parimutuel escrow node - restores the market snapshot, reports on every
// question and writes the snapshot back

use parimutuel_escrow::{EscrowConfig, EscrowError, Market};

fn main() {
    let config = EscrowConfig::from_env();

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_target(false)
        .init();

    println!("\n═══════════════════════════════════════════════");
    println!("     🎲 Parimutuel Escrow");
    println!("═══════════════════════════════════════════════\n");

    let mut market = match Market::load_from_path(&config.state_path) {
        Ok(market) => {
            println!("✅ Loaded persisted state from {}", config.state_path.display());
            market
        }
        Err(EscrowError::Snapshot(reason)) if !config.state_path.exists() => {
            tracing::debug!(%reason, "no snapshot on disk");
            println!("ℹ️  No persisted state found, starting fresh");
            Market::with_config(&config)
        }
        Err(e) => {
            eprintln!("❌ Refusing to start: {}", e);
            std::process::exit(1);
        }
    };
    market.configure(&config);

    println!("📋 {} questions, {} escrowed\n", market.len(), market.total_escrowed());
    for id in market.question_ids() {
        if let Ok(stats) = market.get_question_stats(id) {
            println!(
                "   {} [{}{}] pool {} | paid {} | held {}",
                id,
                stats.state.as_str(),
                if stats.running { "" } else { ", paused" },
                stats.total_staked,
                stats.withdrawn,
                stats.escrowed,
            );
        }
    }

    match market.save_to_path(&config.state_path) {
        Ok(digest) => println!("\n💾 State saved ({})", &digest[..12]),
        Err(e) => {
            eprintln!("❌ Failed to save state: {}", e);
            std::process::exit(1);
        }
    }
}
