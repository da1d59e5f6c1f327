//! matv5-cli/src/main.rs
//!
//! Point d'entrée du binaire `matv5`.
//! Ici, on se contente de préparer l'environnement (logs, rapports d'erreurs)
//! puis on délègue toute la logique à `matv5_cli::run()`.
//!
//! Avantages :
//! - `lib.rs` peut être testé en unité (cargo test -p matv5-cli)
//! - main.rs reste minimal, juste pour le setup global

fn main() {
    // 📌 Initialisation des rapports d'erreurs stylés
    if let Err(e) = color_eyre::install() {
        eprintln!("⚠️ Impossible d'initialiser color-eyre: {e}");
    }

    // 📌 Optionnel : activer les logs si RUST_LOG est défini
    env_logger::init();

    // 📌 Lancer le cœur du CLI
    if let Err(err) = matv5_cli::run() {
        eprintln!("❌ Erreur: {err:#}");
        std::process::exit(1);
    }
}
