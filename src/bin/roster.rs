use anyhow::{anyhow, Result};
use exam_notifier_bot::config::Config;
use exam_notifier_bot::storage::roster::RosterStore;
use std::env;
use std::io;

fn main() -> Result<()> {
    // Initialize basic logging for the tool
    env_logger::init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("check");

    match command {
        "check" => check_roster(),
        "promote" => promote_roster(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn store() -> RosterStore {
    dotenvy::dotenv().ok();
    RosterStore::new(Config::data_dir_from_env().join("roster.json"))
}

fn check_roster() -> Result<()> {
    println!("🔍 Checking roster...");

    let store = store();
    println!("📄 Roster file: {}", store.path().display());

    let roster = store
        .load()
        .map_err(|e| anyhow!("Failed to read roster: {}", e))?;

    println!("✅ Roster loaded successfully!");
    println!("📋 Subscribers per grade:");
    for (grade, count) in roster.counts() {
        println!("  • {grade}: {count}");
    }
    println!("👥 Distinct subscribers: {}", roster.subscriber_count());

    Ok(())
}

fn promote_roster() -> Result<()> {
    println!("⚠️  WARNING: This moves every grade up one year!");
    println!("🤔 Make sure the bot is stopped. Continue? (yes/no)");

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    if input.trim().to_lowercase() != "yes" {
        println!("❌ Promotion cancelled.");
        return Ok(());
    }

    let store = store();
    let mut roster = store
        .load()
        .map_err(|e| anyhow!("Failed to read roster: {}", e))?;

    let promotion = roster.promote();
    store.save(&roster)?;

    println!("✅ Promotion completed!");
    println!("🎓 Graduated: {}", promotion.graduated.len());
    println!("🔄 Moved: {}", promotion.affected.len());

    Ok(())
}

fn print_help() {
    println!("📚 Exam Notifier Bot - Roster Tool");
    println!();
    println!("USAGE:");
    println!("    roster [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    check          Show subscribers per grade (default)");
    println!("    promote        Move every grade up one year - run once per school year!");
    println!("    help           Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    DATA_DIR       Directory holding roster.json (default: ./data)");
    println!();
    println!("EXAMPLES:");
    println!("    roster                     # Check the roster");
    println!("    roster promote             # Yearly promotion (careful!)");
    println!();
}
