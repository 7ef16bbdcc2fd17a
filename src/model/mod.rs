use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::util::normalize_sql;

/// Every object kind the differ understands. Declaration order doubles as
/// the report/sort order, so keep tables first and principals last.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Table,
    View,
    StoredProcedure,
    Function,
    Index,
    Trigger,
    User,
    Role,
    Queue,
    Service,
}

impl ObjectType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ObjectType::Table => "Table",
            ObjectType::View => "View",
            ObjectType::StoredProcedure => "StoredProcedure",
            ObjectType::Function => "Function",
            ObjectType::Index => "Index",
            ObjectType::Trigger => "Trigger",
            ObjectType::User => "User",
            ObjectType::Role => "Role",
            ObjectType::Queue => "Queue",
            ObjectType::Service => "Service",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Identity of a schema object: unique per model as (type, qualified name).
/// Names are stored unbracketed and schema-qualified (`dbo.Orders`); index
/// names carry their table (`dbo.Orders.IX_Orders_Customer`).
#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub name: String,
}

impl ObjectId {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        ObjectId {
            object_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_type, self.name)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub identity: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct TableDef {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexDef {
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub clustered: bool,
}

/// Body-carrying objects: procedures, functions, views, triggers. The body
/// is kept verbatim for rendering; comparisons go through [`normalize_sql`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoutineDef {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PrincipalDef {
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum ObjectDefinition {
    Table(TableDef),
    Index(IndexDef),
    Routine(RoutineDef),
    Principal(PrincipalDef),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SchemaObject {
    pub id: ObjectId,
    pub definition: ObjectDefinition,
}

impl SchemaObject {
    pub fn new(id: ObjectId, definition: ObjectDefinition) -> Self {
        SchemaObject { id, definition }
    }

    /// Structural equality of the type-specific payload. Routine bodies are
    /// compared in normalized form so whitespace/comment drift stays Equal.
    pub fn definition_equals(&self, other: &SchemaObject) -> bool {
        match (&self.definition, &other.definition) {
            (ObjectDefinition::Routine(a), ObjectDefinition::Routine(b)) => {
                normalize_sql(&a.body) == normalize_sql(&b.body)
            }
            (ObjectDefinition::Principal(a), ObjectDefinition::Principal(b)) => {
                normalize_sql(&a.definition) == normalize_sql(&b.definition)
            }
            (a, b) => a == b,
        }
    }
}

/// One side of a comparison: ordered objects plus the dependency edges the
/// planner needs. Built once per run, immutable afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaModel {
    objects: BTreeMap<ObjectId, SchemaObject>,
    dependencies: BTreeSet<(ObjectId, ObjectId)>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object; returns false without replacing when the identity
    /// is already taken (the caller reports the duplicate).
    pub fn insert(&mut self, object: SchemaObject) -> bool {
        use std::collections::btree_map::Entry;
        match self.objects.entry(object.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(object);
                true
            }
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<&SchemaObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.objects.keys()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects `id` depends on (must exist before `id` can be created).
    pub fn dependencies_of(&self, id: &ObjectId) -> Vec<ObjectId> {
        self.dependencies
            .iter()
            .filter(|(from, _)| from == id)
            .map(|(_, to)| to.clone())
            .collect()
    }

    pub fn add_dependency(&mut self, from: ObjectId, to: ObjectId) {
        if from != to {
            self.dependencies.insert((from, to));
        }
    }

    /// Derives the dependency edges from the loaded objects: index -> owning
    /// table, table -> FK-referenced tables, routine/view/trigger -> any
    /// model object whose qualified name appears in the body. Call once after
    /// the last insert.
    pub fn finish(&mut self) {
        let mut edges: Vec<(ObjectId, ObjectId)> = Vec::new();

        for object in self.objects.values() {
            match &object.definition {
                ObjectDefinition::Index(def) => {
                    let table = ObjectId::new(ObjectType::Table, def.table.clone());
                    if self.objects.contains_key(&table) {
                        edges.push((object.id.clone(), table));
                    }
                }
                ObjectDefinition::Table(def) => {
                    for fk in &def.foreign_keys {
                        let referenced =
                            ObjectId::new(ObjectType::Table, fk.referenced_table.clone());
                        if referenced != object.id && self.objects.contains_key(&referenced) {
                            edges.push((object.id.clone(), referenced));
                        }
                    }
                }
                ObjectDefinition::Routine(def) => {
                    edges.extend(self.body_references(&object.id, &def.body));
                }
                ObjectDefinition::Principal(_) => {}
            }
        }

        for (from, to) in edges {
            self.add_dependency(from, to);
        }
    }

    /// Scans a routine body for qualified names of other objects in this
    /// model. Brackets are stripped first so `[dbo].[Orders]` and
    /// `dbo.Orders` both match.
    fn body_references(&self, owner: &ObjectId, body: &str) -> Vec<(ObjectId, ObjectId)> {
        let haystack = body.replace(['[', ']'], "");
        let mut refs = Vec::new();
        for id in self.objects.keys() {
            if id == owner || id.object_type == ObjectType::Index {
                continue;
            }
            let pattern = format!(r"(?i)\b{}\b", regex::escape(&id.name));
            // Names come from parsed identifiers; the escape keeps the regex valid.
            if Regex::new(&pattern)
                .map(|re| re.is_match(&haystack))
                .unwrap_or(false)
            {
                refs.push((owner.clone(), id.clone()));
            }
        }
        refs
    }

    /// Content hash over the ordered objects; equal models hash equal.
    /// Hashed as an entry list because JSON maps cannot key on a struct.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let entries: Vec<(&ObjectId, &SchemaObject)> = self.objects.iter().collect();
        let json = serde_json::to_string(&entries).expect("model must serialize");
        let hash = Sha256::digest(json.as_bytes());
        hex::encode(hash)
    }
}
