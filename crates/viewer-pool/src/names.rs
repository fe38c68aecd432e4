//! Fallback display names for entities the pool could not name.
//!
//! Names come from a plain text file, one per line. They never enter the
//! pool, so releasing an entity that carries one touches only the tracker.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use rand::seq::IndexedRandom;

use crate::error::NamesError;
use crate::identity::Identifier;

const DEFAULT_NAMES: &[&str] = &[
    "Emory", "Pascale", "Augustus", "Felipa", "Nadia", "Karine", "Reyna", "Monty", "Abbie",
    "Marquise", "Darrell", "Ella", "Greg", "Shyanne", "Ambrose", "Doyle", "Jaime", "Connor",
    "Rafaela", "Meghan", "Julianne", "Kenton", "Eileen", "Priscilla", "Gustave", "Sofia",
    "Giovanna", "Monte", "Dulce", "Della", "Ayla", "Leonard", "Timothy", "Houston", "Narciso",
    "Brisa", "Cleveland", "Sienna", "Adrien", "Reese", "Lorenzo", "Roxane", "Zoe", "Catalina",
    "Alejandra", "Marley", "Amaya", "Dorian", "Candace", "Stevie", "Rhoda", "Everett", "Evelyn",
    "Harvey", "Opal", "Chelsea", "Samir", "Simone", "Turner", "Mateo", "Veronica", "Meredith",
    "Vaughn", "Gonzalo", "Ruben", "Edgar", "Tania", "Keith", "Imogene", "Delphine", "Chester",
    "Xavier", "Virgil", "Jonas", "Rory", "Rex", "Doris", "Claire", "Aisha", "Winston", "Edna",
    "Thalia", "Natalia", "Maxwell", "Horace", "Luigi", "Lucius", "Octavia", "Hassan", "Minerva",
    "Cecilia", "Patience", "Henry", "Rowan", "Samara", "Estrella", "Beth", "Lenore", "Jerome",
    "Hosea", "Russell", "Luz", "London", "Serenity", "Elijah", "Magnus", "Sophie", "Barbara",
    "Maurice", "Yvette", "Dagmar", "Sven", "Cora", "Thea", "Layla", "Elsa", "Lola", "Felix",
    "Ernest", "Bella", "Edward", "Esmeralda", "Maia", "Jonathan", "Murray", "Heidi", "Antonio",
    "Caleb", "Laurel", "Elliott", "Markus", "Blaise", "Lily", "Giuseppe", "Nolan", "Joshua",
    "Michelle", "Owen", "Sonia", "Berenice",
];

/// Loaded fallback names, deduplicated case-insensitively in file order.
#[derive(Debug)]
pub struct PredefinedNames {
    path: PathBuf,
    names: RwLock<Vec<Identifier>>,
}

impl PredefinedNames {
    /// Load names from `path`, creating it with the built-in list first if
    /// it does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, NamesError> {
        let names = Self {
            path: path.into(),
            names: RwLock::new(Vec::new()),
        };
        names.reload()?;
        Ok(names)
    }

    /// Build from an in-memory list. Nothing is written to disk.
    pub fn from_names<'a>(raw: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            path: PathBuf::new(),
            names: RwLock::new(dedupe(raw)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. Returns the number of names loaded.
    pub fn reload(&self) -> Result<usize, NamesError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "Names file not found, creating default");
            write_default(&self.path)?;
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|source| NamesError::Read {
            path: self.path.clone(),
            source,
        })?;
        let loaded = dedupe(raw.lines());
        let count = loaded.len();
        *self.names.write().unwrap_or_else(PoisonError::into_inner) = loaded;

        if count == 0 {
            tracing::warn!(path = %self.path.display(), "Names file contains no names");
        } else {
            tracing::info!(path = %self.path.display(), count, "Loaded predefined names");
        }
        Ok(count)
    }

    /// A uniformly random name for which `exclude` is false.
    pub fn random_name(&self, exclude: impl Fn(&Identifier) -> bool) -> Option<Identifier> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        let candidates: Vec<&Identifier> = names.iter().filter(|name| !exclude(name)).collect();
        candidates.choose(&mut rand::rng()).map(|name| (*name).clone())
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn dedupe<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<Identifier> {
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .filter_map(Identifier::parse)
        .filter(|name| seen.insert(name.key().to_string()))
        .collect()
}

fn write_default(path: &Path) -> Result<(), NamesError> {
    let create_err = |source| NamesError::CreateDefault {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(create_err)?;
    }

    let mut body = DEFAULT_NAMES.join("\n");
    body.push('\n');
    std::fs::write(path, body).map_err(create_err)?;

    tracing::info!(path = %path.display(), count = DEFAULT_NAMES.len(), "Created default names file");
    Ok(())
}
