use std::{collections::BTreeMap, fmt, io};

use chrono::{Days, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use tracing::info;

use crate::{
    characters::Character,
    domain::AlchemyColor,
    migrate::{MigrationError, MigrationReport, Origin, SchemaVersion, migrate_to},
    storage::LocalStorage,
    version::VERSION,
};

/// Local storage key holding the whole serialized container.
pub const STORAGE_KEY: &str = "idleon-companion";

/// Version a freshly created container starts at; the migrations walk it
/// forward from there.
pub const INITIAL_VERSION: &str = "0.2.0";

/// Pre-unification releases tracked their version in a standalone entry.
const LEGACY_VERSION_KEY: &str = "version";

const DEFAULT_DAILY_RESET: &str = "12:00";

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    SerdeJson(serde_json::Error),
    Migration(MigrationError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::SerdeJson(e) => write!(f, "json error: {e}"),
            Self::Migration(e) => write!(f, "migration failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::SerdeJson(e) => Some(e),
            Self::Migration(e) => Some(e),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(value)
    }
}

impl From<MigrationError> for StoreError {
    fn from(value: MigrationError) -> Self {
        Self::Migration(value)
    }
}

/// The whole container. Fields the typed model does not know about (written
/// by a newer release, say) are carried in `extra` and saved back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default, deserialize_with = "or_default")]
    pub alchemy: AlchemyData,
    #[serde(default, deserialize_with = "map_or_default")]
    pub cards: BTreeMap<String, Count>,
    #[serde(default, deserialize_with = "or_default")]
    pub chars: Vec<Character>,
    #[serde(default, deserialize_with = "map_or_default")]
    pub checklist: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "map_or_default")]
    pub stamps: BTreeMap<String, Count>,
    #[serde(default, deserialize_with = "map_or_default")]
    pub star_signs: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "map_or_default")]
    pub statues: BTreeMap<String, StatueInfo>,
    #[serde(default, deserialize_with = "or_default")]
    pub tasks: TaskData,
    #[serde(default = "initial_version")]
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            alchemy: AlchemyData::default(),
            cards: BTreeMap::new(),
            chars: Vec::new(),
            checklist: BTreeMap::new(),
            stamps: BTreeMap::new(),
            star_signs: BTreeMap::new(),
            statues: BTreeMap::new(),
            tasks: TaskData::default(),
            version: initial_version(),
            extra: Map::new(),
        }
    }
}

impl AppState {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn schema_version(&self) -> Option<SchemaVersion> {
        SchemaVersion::parse(&self.version)
    }
}

fn initial_version() -> String {
    INITIAL_VERSION.to_string()
}

/// A game counter exactly as the browser stored it.
///
/// Any JSON number is kept, fractions and values past `u64` included, and
/// `null` reads as zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Count(Number);

impl Count {
    pub fn new(value: u64) -> Self {
        Self(Number::from(value))
    }

    /// Truncated towards zero; negative values read as 0 and huge ones
    /// saturate.
    pub fn as_u64(&self) -> u64 {
        match self.0.as_u64() {
            Some(n) => n,
            None => self.0.as_f64().map_or(0, |f| f as u64),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.0.as_f64().unwrap_or_default()
    }

    pub fn number(&self) -> &Number {
        &self.0
    }
}

impl Default for Count {
    fn default() -> Self {
        Self::new(0)
    }
}

impl From<u64> for Count {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Number> for Count {
    fn from(value: Number) -> Self {
        Self(value)
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Number>::deserialize(deserializer)?
            .map(Self)
            .unwrap_or_default())
    }
}

/// `null` reads as the field's default.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A keyed map where both the map and any of its values may be `null`.
pub(crate) fn map_or_default<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let raw = Option::<BTreeMap<String, Option<T>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.unwrap_or_default()))
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlchemyData {
    /// Bubble levels per color name, indexed by bubble slot.
    #[serde(default = "empty_bubbles", deserialize_with = "bubble_slots")]
    pub upgrades: BTreeMap<String, Vec<Count>>,
    /// Target bubble levels, same layout as `upgrades`.
    #[serde(default = "empty_bubbles", deserialize_with = "bubble_slots")]
    pub goals: BTreeMap<String, Vec<Count>>,
    #[serde(default, deserialize_with = "or_default")]
    pub vials: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AlchemyData {
    fn default() -> Self {
        Self {
            upgrades: empty_bubbles(),
            goals: empty_bubbles(),
            vials: Map::new(),
            extra: Map::new(),
        }
    }
}

impl AlchemyData {
    pub fn upgrades(&self, color: AlchemyColor) -> &[Count] {
        self.upgrades.get(color.as_str()).map_or(&[], Vec::as_slice)
    }

    pub fn goals(&self, color: AlchemyColor) -> &[Count] {
        self.goals.get(color.as_str()).map_or(&[], Vec::as_slice)
    }
}

fn empty_bubbles() -> BTreeMap<String, Vec<Count>> {
    AlchemyColor::ALL
        .into_iter()
        .map(|color| (color.as_str().to_string(), Vec::new()))
        .collect()
}

/// Every known color is present afterwards; colors from newer releases are
/// kept as they are.
fn bubble_slots<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<Count>>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored: BTreeMap<String, Vec<Count>> = map_or_default(deserializer)?;
    let mut slots = empty_bubbles();
    slots.extend(stored);
    Ok(slots)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatueInfo {
    #[serde(default)]
    pub level: Count,
    #[serde(default)]
    pub progress: Count,
    #[serde(default, deserialize_with = "or_default")]
    pub golden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    #[serde(default, deserialize_with = "or_default")]
    pub tasks: Vec<Task>,
    /// Local time of day, `HH:MM`.
    #[serde(default = "default_daily_reset", deserialize_with = "daily_reset")]
    pub daily_reset: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TaskData {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            daily_reset: default_daily_reset(),
            extra: Map::new(),
        }
    }
}

impl TaskData {
    pub fn daily_reset_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_reset.trim(), "%H:%M").ok()
    }

    /// First reset strictly after `now`, or `None` if `dailyReset` is unreadable.
    pub fn next_reset_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date().and_time(self.daily_reset_time()?);
        if today > now {
            Some(today)
        } else {
            today.checked_add_days(Days::new(1))
        }
    }
}

fn default_daily_reset() -> String {
    DEFAULT_DAILY_RESET.to_string()
}

fn daily_reset<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_daily_reset))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(default, deserialize_with = "or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "or_default")]
    pub done: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The persisted container: one [`AppState`] mirrored into local storage.
///
/// Every mutation made through the store is written back before the call
/// returns. Documents from outside (older local copies, remote downloads) are
/// always run through the migrations before they replace the current state.
pub struct StateStore<S: LocalStorage> {
    storage: S,
    state: AppState,
    last_migration: MigrationReport,
}

impl<S: LocalStorage> StateStore<S> {
    pub fn open(mut storage: S) -> Result<Self, StoreError> {
        let (document, origin) = match storage.get_item(STORAGE_KEY) {
            Some(raw) => (serde_json::from_str(&raw)?, Origin::Container),
            None => initial_document(&storage)?,
        };
        let (state, last_migration) = migrate_document(document, &mut storage, origin)?;

        let mut store = Self {
            storage,
            state,
            last_migration,
        };
        store.save()?;
        Ok(store)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn last_migration(&self) -> &MigrationReport {
        &self.last_migration
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut AppState) -> R) -> Result<R, StoreError> {
        let out = f(&mut self.state);
        self.save()?;
        Ok(out)
    }

    pub fn replace(&mut self, state: AppState) -> Result<(), StoreError> {
        self.state = state;
        self.save()
    }

    /// Replace the whole container with an unvalidated document, migrating it
    /// first. Local storage outside the container is never read or purged.
    /// The current state is untouched if migration or decoding fails.
    pub fn replace_document(&mut self, document: Value) -> Result<&MigrationReport, StoreError> {
        let (state, report) = migrate_document(document, &mut self.storage, Origin::Container)?;
        self.state = state;
        self.last_migration = report;
        self.save()?;
        Ok(&self.last_migration)
    }

    pub fn migrate(&mut self) -> Result<&MigrationReport, StoreError> {
        let document = serde_json::to_value(&self.state)?;
        self.replace_document(document)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(self.state.to_json()?)
    }

    pub fn save(&mut self) -> Result<(), StoreError> {
        let text = self.state.to_json()?;
        self.storage.set_item(STORAGE_KEY, text)?;
        Ok(())
    }
}

/// A device upgrading from a pre-unification release still has its standalone
/// `version` entry; the new container starts from that version so the legacy
/// gates can pick up the old per-field entries.
fn initial_document<S: LocalStorage>(storage: &S) -> Result<(Value, Origin), StoreError> {
    let mut state = AppState::default();
    let origin = match storage.get_item(LEGACY_VERSION_KEY) {
        Some(legacy) => {
            state.version = legacy;
            Origin::LegacyStorage
        }
        None => Origin::Container,
    };
    info!(version = %state.version, ?origin, "initializing state with defaults");
    Ok((serde_json::to_value(state)?, origin))
}

fn migrate_document<S: LocalStorage>(
    document: Value,
    storage: &mut S,
    origin: Origin,
) -> Result<(AppState, MigrationReport), StoreError> {
    let (document, report) = migrate_to(document, storage, VERSION, origin)?;
    let state = serde_json::from_value(document)?;
    Ok((state, report))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        domain::{BUBBLE_SLOTS, STAMPS, STATUES},
        storage::{FileStorage, MemoryStorage},
        version::VERSION,
    };

    #[test]
    fn fresh_store_is_fully_initialized() {
        let store = StateStore::open(MemoryStorage::new()).unwrap();
        let state = store.state();

        assert_eq!(state.version, VERSION);
        assert_eq!(state.statues.len(), STATUES.len());
        assert_eq!(state.stamps.len(), STAMPS.len());
        assert_eq!(state.tasks.daily_reset, "12:00");
        for color in AlchemyColor::ALL {
            assert_eq!(state.alchemy.upgrades(color), vec![Count::default(); BUBBLE_SLOTS]);
            assert_eq!(state.alchemy.goals(color), vec![Count::default(); BUBBLE_SLOTS]);
        }

        let persisted = store.storage().get_item(STORAGE_KEY).unwrap();
        assert_eq!(AppState::from_json(&persisted).unwrap(), *state);
    }

    #[test]
    fn updates_persist_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();

        let mut store = StateStore::open(FileStorage::open(tmp.path()).unwrap()).unwrap();
        store
            .update(|state| {
                state.cards.insert("Green Mushroom".to_string(), Count::new(5));
                state.statues.get_mut("Power").unwrap().golden = true;
            })
            .unwrap();
        drop(store);

        let store = StateStore::open(FileStorage::open(tmp.path()).unwrap()).unwrap();
        assert!(store.last_migration().is_noop());
        assert_eq!(store.state().cards["Green Mushroom"], Count::new(5));
        assert!(store.state().statues["Power"].golden);
    }

    #[test]
    fn legacy_entries_seed_a_new_container() {
        let storage = MemoryStorage::with_entries([
            ("version", "0.1.2"),
            ("cards", r#"{"Frog":7}"#),
            ("chars", r#"[{"name":"Ann","skills":{"Mining":3},"statues":{"Power":2}}]"#),
            ("tasks", r#"{"tasks":[{"name":"Daily shop","done":true}],"dailyReset":"06:30"}"#),
            ("iconify", "cache"),
        ]);

        let store = StateStore::open(storage).unwrap();
        let state = store.state();

        assert_eq!(store.last_migration().from, SchemaVersion::new(0, 1, 2));
        assert_eq!(state.cards["Frog"], Count::new(7));
        assert_eq!(state.chars[0].name, "Ann");
        assert_eq!(state.chars[0].skill_level("Trapping"), 0);
        assert!(!state.chars[0].extra.contains_key("statues"));
        assert_eq!(state.tasks.tasks[0].name, "Daily shop");
        assert_eq!(state.tasks.daily_reset, "06:30");
        assert_eq!(
            store.storage().keys(),
            vec!["iconify".to_string(), STORAGE_KEY.to_string()]
        );
    }

    #[test]
    fn corrupt_local_copy_fails_open() {
        let storage = MemoryStorage::with_entries([(STORAGE_KEY, "{")]);
        assert!(matches!(
            StateStore::open(storage),
            Err(StoreError::SerdeJson(_))
        ));
    }

    #[test]
    fn replace_document_migrates_old_shapes() {
        let mut store = StateStore::open(MemoryStorage::new()).unwrap();
        let report = store
            .replace_document(json!({
                "version": "0.2.1",
                "alchemy": { "upgrades": { "Orange": [3], "Green": [], "Purple": [], "Yellow": [] } },
                "chars": [{ "name": "Bob", "skills": {}, "statues": { "Power": 1 } }],
            }))
            .unwrap();

        assert_eq!(report.applied.len(), 4);
        let state = store.state();
        assert_eq!(state.version, VERSION);
        assert_eq!(state.alchemy.upgrades(AlchemyColor::Orange)[0], Count::new(3));
        assert_eq!(state.alchemy.goals(AlchemyColor::Yellow).len(), BUBBLE_SLOTS);
        assert!(state.chars[0].extra.is_empty());
        assert_eq!(state.statues.len(), STATUES.len());
    }

    #[test]
    fn failed_replace_keeps_current_state() {
        let mut store = StateStore::open(MemoryStorage::new()).unwrap();
        store
            .update(|state| {
                state.checklist.insert("boss".to_string(), true);
            })
            .unwrap();
        let before = store.state().clone();

        let err = store
            .replace_document(json!({ "version": "0.3.0", "cards": "not a map" }))
            .unwrap_err();

        assert!(matches!(err, StoreError::SerdeJson(_)));
        assert_eq!(*store.state(), before);
    }

    #[test]
    fn newer_fields_and_loose_values_survive_replace() {
        let mut store = StateStore::open(MemoryStorage::new()).unwrap();
        store
            .replace_document(json!({
                "version": "0.3.0",
                "refinery": { "salts": 3 },
                "cards": { "Frog": 1.5, "Huge": 1e20, "Gone": null },
                "checklist": null,
                "statues": {
                    "Power": { "level": 2, "progress": 2.5, "golden": null, "onyx": true },
                },
                "tasks": { "dailyReset": null, "streak": 4 },
                "alchemy": { "upgrades": { "Dark": [1] }, "sigils": [] },
            }))
            .unwrap();

        let state = store.state();
        assert_eq!(state.extra["refinery"], json!({ "salts": 3 }));
        assert_eq!(state.cards["Frog"].as_f64(), 1.5);
        assert_eq!(state.cards["Huge"].as_u64(), u64::MAX);
        assert_eq!(state.cards["Gone"], Count::default());
        assert!(state.checklist.is_empty());
        assert_eq!(state.statues["Power"].progress.as_f64(), 2.5);
        assert!(!state.statues["Power"].golden);
        assert_eq!(state.statues["Power"].extra["onyx"], json!(true));
        assert_eq!(state.tasks.daily_reset, "12:00");
        assert_eq!(state.tasks.extra["streak"], json!(4));
        assert_eq!(state.alchemy.upgrades["Dark"], [Count::new(1)]);
        assert!(state.alchemy.upgrades(AlchemyColor::Orange).is_empty());
        assert_eq!(state.alchemy.extra["sigils"], json!([]));

        let persisted: Value =
            serde_json::from_str(&store.storage().get_item(STORAGE_KEY).unwrap()).unwrap();
        assert_eq!(persisted["refinery"], json!({ "salts": 3 }));
        assert_eq!(persisted["cards"]["Frog"], json!(1.5));
        assert_eq!(persisted["statues"]["Power"]["onyx"], json!(true));
        assert_eq!(persisted["tasks"]["streak"], json!(4));
        assert_eq!(persisted["alchemy"]["upgrades"]["Dark"], json!([1]));
    }

    #[test]
    fn replacing_an_unversioned_document_leaves_storage_alone() {
        let storage = MemoryStorage::with_entries([
            ("cards", r#"{"x":1}"#),
            ("someFutureKey", "kept"),
        ]);
        let mut store = StateStore::open(storage).unwrap();

        store.replace_document(json!({ "chars": [] })).unwrap();

        assert!(!store.state().cards.contains_key("x"));
        assert_eq!(
            store.storage().keys(),
            vec![
                "cards".to_string(),
                STORAGE_KEY.to_string(),
                "someFutureKey".to_string()
            ]
        );
    }

    #[test]
    fn migrating_twice_is_a_noop() {
        let mut store = StateStore::open(MemoryStorage::new()).unwrap();
        let before = store.to_json().unwrap();

        assert!(store.migrate().unwrap().is_noop());
        assert_eq!(store.to_json().unwrap(), before);
    }

    #[test]
    fn null_bubble_slots_read_as_zero() {
        let alchemy: AlchemyData = serde_json::from_value(json!({
            "upgrades": { "Orange": [1, null, 3] },
        }))
        .unwrap();

        assert_eq!(
            alchemy.upgrades(AlchemyColor::Orange),
            [Count::new(1), Count::new(0), Count::new(3)]
        );
        assert_eq!(alchemy.goals.len(), 4);
    }

    #[test]
    fn next_daily_reset() {
        let tasks = TaskData {
            daily_reset: "06:30".to_string(),
            ..TaskData::default()
        };
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let at = |h, m| day.and_hms_opt(h, m, 0).unwrap();

        assert_eq!(tasks.next_reset_after(at(5, 0)), Some(at(6, 30)));
        assert_eq!(
            tasks.next_reset_after(at(6, 30)),
            Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(6, 30, 0).unwrap())
        );

        let broken = TaskData {
            daily_reset: "noon".to_string(),
            ..TaskData::default()
        };
        assert_eq!(broken.next_reset_after(at(5, 0)), None);
    }
}
