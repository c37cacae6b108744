use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use sourced_runtime::snapshot::{SnapshotHeader, SqlColumn, SqlMapping};
use sourced_runtime::{AuditingInformation, VersionedSnapshot, INITIAL_SNAPSHOT_VERSION};

pub const TASK: &str = "TASK";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub identifier: String,
    pub version: i64,
    pub auditing: AuditingInformation,
    pub project_id: String,
    pub title: String,
    pub done: bool,
}

impl Task {
    pub fn new(identifier: &str, project_id: &str, title: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            version: INITIAL_SNAPSHOT_VERSION,
            auditing: AuditingInformation::default(),
            project_id: project_id.to_string(),
            title: title.to_string(),
            done: false,
        }
    }
}

impl VersionedSnapshot for Task {
    const KIND: &'static str = TASK;

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn auditing(&self) -> &AuditingInformation {
        &self.auditing
    }

    fn auditing_mut(&mut self) -> &mut AuditingInformation {
        &mut self.auditing
    }

    fn root_context_identifier(&self) -> &str {
        &self.project_id
    }
}

pub struct TaskMapping;

const TASK_COLUMNS: [SqlColumn; 3] = [
    SqlColumn::new("project_id", "TEXT NOT NULL"),
    SqlColumn::new("title", "TEXT NOT NULL"),
    SqlColumn::new("done", "INTEGER NOT NULL"),
];

impl SqlMapping<Task> for TaskMapping {
    fn table(&self) -> &str {
        "tasks"
    }

    fn columns(&self) -> &[SqlColumn] {
        &TASK_COLUMNS
    }

    fn to_values(&self, task: &Task) -> Vec<Value> {
        vec![
            Value::Text(task.project_id.clone()),
            Value::Text(task.title.clone()),
            Value::Integer(task.done as i64),
        ]
    }

    fn from_row(
        &self,
        header: SnapshotHeader,
        row: &Row<'_>,
        first_column: usize,
    ) -> rusqlite::Result<Task> {
        Ok(Task {
            identifier: header.identifier,
            version: header.version,
            auditing: header.auditing,
            project_id: row.get(first_column)?,
            title: row.get(first_column + 1)?,
            done: row.get::<_, i64>(first_column + 2)? != 0,
        })
    }
}
