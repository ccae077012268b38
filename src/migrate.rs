//! Forward-only migrations of the persisted container document.
//!
//! Every gate is a threshold version plus a transformation of the raw JSON
//! document. The engine folds the document through each gate whose threshold is
//! above the document's `version`, in order, then stamps the build version.
//! Gates work on untyped JSON so that documents written by any release
//! (including ones that predate fields the typed model requires) can be read.
//!
//! The two oldest gates read and purge the per-field entries of
//! pre-unification releases. They only run for a container that was just
//! seeded from such a device's storage ([`Origin::LegacyStorage`]), never for
//! a stored container or a downloaded copy.

use std::{fmt, io, str::FromStr};

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{
    domain::{AlchemyColor, BUBBLE_SLOTS, STATUES, WORLD3_SKILLS, stamp_names},
    state::STORAGE_KEY,
    storage::LocalStorage,
    version::VERSION,
};

/// Top-level fields that pre-unification releases stored as separate entries.
pub const LEGACY_FIELDS: [&str; 5] = ["alchemy", "cards", "chars", "checklist", "tasks"];

/// Entries that survive the legacy purge. `iconify` belongs to the icon cache.
pub const PRESERVED_KEYS: [&str; 2] = [STORAGE_KEY, "iconify"];

#[derive(Debug)]
pub enum MigrationError {
    MalformedLegacyData {
        key: String,
        source: serde_json::Error,
    },
    Storage(io::Error),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLegacyData { key, source } => {
                write!(f, "malformed legacy entry {key:?}: {source}")
            }
            Self::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedLegacyData { source, .. } => Some(source),
            Self::Storage(e) => Some(e),
        }
    }
}

impl From<io::Error> for MigrationError {
    fn from(value: io::Error) -> Self {
        Self::Storage(value)
    }
}

/// `major.minor.patch`, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SchemaVersion {
    pub const ZERO: SchemaVersion = SchemaVersion::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);
        let core = raw.split(['-', '+']).next()?;
        let mut parts = core.split('.');
        let major: u64 = parts.next()?.parse().ok()?;
        let minor: u64 = parts.next()?.parse().ok()?;
        let patch: u64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// The migration cursor of a document. Missing or unreadable versions
    /// sort before every gate.
    pub fn of_document(document: &Value) -> Self {
        match document.get("version") {
            Some(Value::String(raw)) => Self::parse(raw).unwrap_or_else(|| {
                warn!(version = %raw, "unparseable state version; applying all migrations");
                Self::ZERO
            }),
            _ => Self::ZERO,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid version: {s}"))
    }
}

/// Where the document being migrated came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A new container seeded from a pre-unification `version` entry.
    LegacyStorage,
    /// A stored container or a document from outside, such as a remote copy.
    Container,
}

type GateFn = fn(Map<String, Value>, &mut dyn LocalStorage) -> Result<Map<String, Value>, MigrationError>;

pub struct Gate {
    pub threshold: SchemaVersion,
    pub description: &'static str,
    /// Reads or rewrites local storage; skipped unless the origin is
    /// [`Origin::LegacyStorage`].
    pub legacy_storage: bool,
    pub apply: GateFn,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("threshold", &self.threshold)
            .field("description", &self.description)
            .field("legacy_storage", &self.legacy_storage)
            .finish()
    }
}

/// Ordered by threshold.
pub static GATES: [Gate; 6] = [
    Gate {
        threshold: SchemaVersion::new(0, 1, 1),
        description: "drop legacy tasks entry",
        legacy_storage: true,
        apply: drop_legacy_tasks,
    },
    Gate {
        threshold: SchemaVersion::new(0, 2, 0),
        description: "graft legacy per-field entries and purge storage",
        legacy_storage: true,
        apply: graft_legacy_entries,
    },
    Gate {
        threshold: SchemaVersion::new(0, 2, 2),
        description: "add star signs and constellations",
        legacy_storage: false,
        apply: add_star_signs,
    },
    Gate {
        threshold: SchemaVersion::new(0, 2, 3),
        description: "add world 3 skills",
        legacy_storage: false,
        apply: add_world3_skills,
    },
    Gate {
        threshold: SchemaVersion::new(0, 2, 4),
        description: "add bubble slots and bubble goals",
        legacy_storage: false,
        apply: add_bubble_slots,
    },
    Gate {
        threshold: SchemaVersion::new(0, 3, 0),
        description: "move statues to global state and track stamps",
        legacy_storage: false,
        apply: globalize_statues_and_stamps,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: SchemaVersion,
    pub applied: Vec<SchemaVersion>,
    pub to: String,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Bring a stored or downloaded container up to the build version. Local
/// storage is left alone.
pub fn migrate<S: LocalStorage>(
    document: Value,
    storage: &mut S,
) -> Result<(Value, MigrationReport), MigrationError> {
    migrate_to(document, storage, VERSION, Origin::Container)
}

/// Bring a container seeded from pre-unification storage up to the build
/// version, grafting and then purging the old per-field entries.
pub fn migrate_legacy<S: LocalStorage>(
    document: Value,
    storage: &mut S,
) -> Result<(Value, MigrationReport), MigrationError> {
    migrate_to(document, storage, VERSION, Origin::LegacyStorage)
}

pub fn migrate_to<S: LocalStorage>(
    document: Value,
    storage: &mut S,
    target: &str,
    origin: Origin,
) -> Result<(Value, MigrationReport), MigrationError> {
    let from = SchemaVersion::of_document(&document);
    let root = match document {
        Value::Object(root) => root,
        other => {
            warn!(kind = json_kind(&other), "state document is not an object; starting empty");
            Map::new()
        }
    };

    let mut applied = Vec::new();
    let mut root = GATES.iter().try_fold(root, |root, gate| {
        if from >= gate.threshold {
            return Ok(root);
        }
        if gate.legacy_storage && origin != Origin::LegacyStorage {
            debug!(gate = %gate.threshold, "not a legacy container; skipping storage migration");
            return Ok(root);
        }
        debug!(gate = %gate.threshold, description = gate.description, "applying state migration");
        applied.push(gate.threshold);
        (gate.apply)(root, &mut *storage)
    })?;

    if SchemaVersion::parse(target).is_some_and(|target| from > target) {
        warn!(from = %from, to = target, "state was written by a newer release");
    }
    root.insert("version".to_string(), Value::String(target.to_string()));

    if !applied.is_empty() {
        info!(from = %from, to = target, gates = applied.len(), "state migrated");
    }

    Ok((
        Value::Object(root),
        MigrationReport {
            from,
            applied,
            to: target.to_string(),
        },
    ))
}

fn drop_legacy_tasks(
    root: Map<String, Value>,
    storage: &mut dyn LocalStorage,
) -> Result<Map<String, Value>, MigrationError> {
    // The task schema changed incompatibly; old entries are unreadable.
    storage.remove_item("tasks")?;
    Ok(root)
}

fn graft_legacy_entries(
    mut root: Map<String, Value>,
    storage: &mut dyn LocalStorage,
) -> Result<Map<String, Value>, MigrationError> {
    for key in LEGACY_FIELDS {
        if let Some(raw) = storage.get_item(key) {
            let value: Value = serde_json::from_str(&raw).map_err(|source| {
                MigrationError::MalformedLegacyData {
                    key: key.to_string(),
                    source,
                }
            })?;
            root.insert(key.to_string(), value);
        }
    }

    for key in storage.keys() {
        if !PRESERVED_KEYS.contains(&key.as_str()) {
            storage.remove_item(&key)?;
        }
    }
    Ok(root)
}

fn add_star_signs(
    mut root: Map<String, Value>,
    _storage: &mut dyn LocalStorage,
) -> Result<Map<String, Value>, MigrationError> {
    for character in characters_mut(&mut root) {
        object_entry(character, "constellations");
        object_entry(character, "starSigns");
    }
    object_entry(&mut root, "starSigns");
    Ok(root)
}

fn add_world3_skills(
    mut root: Map<String, Value>,
    _storage: &mut dyn LocalStorage,
) -> Result<Map<String, Value>, MigrationError> {
    for character in characters_mut(&mut root) {
        let skills = object_entry(character, "skills");
        for skill in WORLD3_SKILLS {
            skills.entry(skill).or_insert_with(|| json!(0));
        }
    }
    Ok(root)
}

fn add_bubble_slots(
    mut root: Map<String, Value>,
    _storage: &mut dyn LocalStorage,
) -> Result<Map<String, Value>, MigrationError> {
    let alchemy = object_entry(&mut root, "alchemy");
    for field in ["upgrades", "goals"] {
        let by_color = object_entry(alchemy, field);
        for color in AlchemyColor::ALL {
            let slots = array_entry(by_color, color.as_str());
            if slots.len() < BUBBLE_SLOTS {
                slots.resize(BUBBLE_SLOTS, Value::Null);
            }
            for slot in slots.iter_mut().take(BUBBLE_SLOTS) {
                if slot.is_null() {
                    *slot = json!(0);
                }
            }
        }
    }
    Ok(root)
}

fn globalize_statues_and_stamps(
    mut root: Map<String, Value>,
    _storage: &mut dyn LocalStorage,
) -> Result<Map<String, Value>, MigrationError> {
    let statues: Map<String, Value> = STATUES
        .iter()
        .map(|name| {
            (
                name.to_string(),
                json!({ "level": 0, "progress": 0, "golden": false }),
            )
        })
        .collect();
    root.insert("statues".to_string(), Value::Object(statues));

    for character in characters_mut(&mut root) {
        character.remove("statues");
    }

    let stamps: Map<String, Value> = stamp_names()
        .map(|name| (name.to_string(), json!(0)))
        .collect();
    root.insert("stamps".to_string(), Value::Object(stamps));
    Ok(root)
}

fn characters_mut(root: &mut Map<String, Value>) -> impl Iterator<Item = &mut Map<String, Value>> {
    root.get_mut("chars")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

/// `map[key]` as an object, replacing a missing or non-object value with `{}`.
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just set to an object"),
    }
}

/// `map[key]` as an array, replacing a missing or non-array value with `[]`.
fn array_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Vec<Value> {
    let slot = map.entry(key).or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(inner) => inner,
        _ => unreachable!("slot was just set to an array"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
