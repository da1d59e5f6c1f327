//! matv5-cli — conversion MAT ↔ JSON sur disque.
//!
//! Le sens de conversion est décidé par l'extension : un `.mat` devient le
//! `.json` voisin, un `.json` devient le `.mat` voisin. Le CLI ne consomme
//! que `loadmat`/`savemat` du cœur ; le pont JSON passe par l'implémentation
//! serde de [`Value`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use matv5_core::{loadmat, savemat, Value};

/// Arguments du binaire `matv5`.
#[derive(Debug, Parser)]
#[command(
    name = "matv5",
    version,
    about = "Convertit des fichiers MAT (niveau 5) en JSON, et inversement."
)]
pub struct Args {
    /// Fichiers .mat ou .json à convertir
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Écrase la destination si elle existe déjà
    #[arg(short, long)]
    pub force: bool,

    /// Supprime le fichier d'entrée après conversion
    #[arg(long)]
    pub remove_input: bool,
}

/// Cœur du CLI : parse les arguments et convertit chaque fichier.
/// S'arrête à la première erreur.
pub fn run() -> Result<()> {
    let args = Args::parse();
    for path in &args.files {
        convert_one(path, args.force, args.remove_input)?;
    }
    Ok(())
}

/// Convertit un fichier, dans le sens dicté par son extension.
pub fn convert_one(path: &Path, force: bool, remove_input: bool) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mat") => {
            let dest = path.with_extension("json");
            ensure_dest(&dest, force)?;
            let data = loadmat(path, false)
                .with_context(|| format!("lecture de {}", path.display()))?;
            let json = serde_json::to_string(&Value::Record(data))?;
            fs::write(&dest, json)
                .with_context(|| format!("écriture de {}", dest.display()))?;
            log::info!("{} → {}", path.display(), dest.display());
        }
        Some("json") => {
            let dest = path.with_extension("mat");
            ensure_dest(&dest, force)?;
            let text = fs::read_to_string(path)
                .with_context(|| format!("lecture de {}", path.display()))?;
            let value: Value = serde_json::from_str(&text)
                .with_context(|| format!("JSON invalide dans {}", path.display()))?;
            let Some(data) = value.as_record() else {
                bail!("{}: le document JSON de tête doit être un objet", path.display());
            };
            savemat(&dest, data)
                .with_context(|| format!("écriture de {}", dest.display()))?;
            log::info!("{} → {}", path.display(), dest.display());
        }
        _ => bail!("extension non prise en charge: {}", path.display()),
    }
    if remove_input {
        fs::remove_file(path)
            .with_context(|| format!("suppression de {}", path.display()))?;
    }
    Ok(())
}

fn ensure_dest(dest: &Path, force: bool) -> Result<()> {
    if dest.exists() && !force {
        bail!("le fichier {} existe déjà (utilise --force)", dest.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use matv5_core::{loadmat_bytes, savemat_bytes, Record};

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("matv5_test_{pid}_{nanos}_{name}"));
        p
    }

    fn sample() -> Record {
        let mut data = Record::new();
        data.insert("x".to_owned(), Value::Int(42));
        data.insert("s".to_owned(), Value::Str("hello".into()));
        data.insert(
            "v".to_owned(),
            Value::List(vec![Value::Float(1.5), Value::Float(2.5)]),
        );
        data
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["matv5", "a.mat", "b.json", "--force"]).unwrap();
        assert_eq!(args.files.len(), 2);
        assert!(args.force);
        assert!(!args.remove_input);

        // au moins un fichier requis
        assert!(Args::try_parse_from(["matv5"]).is_err());
    }

    #[test]
    fn json_bridge_rejects_null_and_bool() {
        assert!(serde_json::from_str::<Value>("null").is_err());
        assert!(serde_json::from_str::<Value>("true").is_err());
        assert!(serde_json::from_str::<Value>("{\"a\": [1, null]}").is_err());
    }

    #[test]
    fn json_bridge_keeps_key_order() {
        let v: Value = serde_json::from_str("{\"z\": 1, \"a\": 2.5, \"m\": \"x\"}").unwrap();
        let rec = v.as_record().unwrap();
        let keys: Vec<&str> = rec.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
        assert_eq!(rec.get("z"), Some(&Value::Int(1)));
        assert_eq!(rec.get("a"), Some(&Value::Float(2.5)));
    }

    #[test]
    fn mat_to_json_to_mat() {
        let data = sample();
        let mat_in = temp_path("in.mat");
        fs::write(&mat_in, savemat_bytes(&data).unwrap()).unwrap();

        // .mat → .json
        convert_one(&mat_in, false, false).unwrap();
        let json_path = mat_in.with_extension("json");
        let text = fs::read_to_string(&json_path).unwrap();
        assert!(text.starts_with('{'));

        // .json → .mat (écrase l'entrée d'origine)
        convert_one(&json_path, true, true).unwrap();
        assert!(!json_path.exists()); // --remove-input
        let back = loadmat_bytes(&fs::read(&mat_in).unwrap(), false).unwrap();
        assert_eq!(back, data);

        let _ = fs::remove_file(&mat_in);
    }

    #[test]
    fn existing_destination_needs_force() {
        let data = sample();
        let mat_in = temp_path("dup.mat");
        fs::write(&mat_in, savemat_bytes(&data).unwrap()).unwrap();
        let json_path = mat_in.with_extension("json");
        fs::write(&json_path, "{}").unwrap();

        assert!(convert_one(&mat_in, false, false).is_err());
        convert_one(&mat_in, true, false).unwrap();

        let _ = fs::remove_file(&mat_in);
        let _ = fs::remove_file(&json_path);
    }

    #[test]
    fn unknown_extension_is_refused() {
        assert!(convert_one(Path::new("donnees.csv"), false, false).is_err());
    }

    #[test]
    fn top_level_json_must_be_an_object() {
        let json_path = temp_path("liste.json");
        fs::write(&json_path, "[1, 2, 3]").unwrap();
        let err = convert_one(&json_path, false, false).unwrap_err();
        assert!(format!("{err}").contains("objet"));
        let _ = fs::remove_file(&json_path);
    }
}
