//! Row operations: select, select_one, insert, update, delete

use serde_json::Value;

use super::{failed, Client};
use crate::errors::{ClientError, ClientResult, ErrorKind};
use crate::observability::CallArgs;
use crate::operation::Operation;
use crate::query::{
    compile_delete, compile_insert, compile_select, compile_select_one, compile_update,
    describe_filters, Fields, Filter, Row,
};

impl Client {
    /// Rows matching every predicate, in backend order
    ///
    /// `Ok(None)` means the backend answered without a row list, which is
    /// an unexpected shape rather than "no rows".
    pub async fn select(
        &self,
        table: &str,
        fields: &Fields,
        filters: &[Filter],
    ) -> ClientResult<Option<Vec<Row>>> {
        let args = CallArgs::new()
            .with("table", table)
            .with("fields", fields)
            .with("filters", describe_filters(filters));

        self.observer
            .observe(Operation::Select, args, async {
                let stmt = compile_select(table, fields, filters)?;
                let body = self
                    .conn
                    .send_statement(&stmt)
                    .await
                    .map_err(failed(Operation::Select))?;
                Ok(rows(body))
            })
            .await
    }

    /// Exactly one matching row; none is a `NotFound` error
    pub async fn select_one(&self, table: &str, fields: &Fields, filters: &[Filter]) -> ClientResult<Row> {
        let args = CallArgs::new()
            .with("table", table)
            .with("fields", fields)
            .with("filters", describe_filters(filters));

        self.observer
            .observe(Operation::SelectOne, args, async {
                let stmt = compile_select_one(table, fields, filters)?;
                let body = self
                    .conn
                    .send_statement(&stmt)
                    .await
                    .map_err(failed(Operation::SelectOne))?;

                match body {
                    Value::Object(row) => Ok(row),
                    Value::Array(mut items) if items.len() == 1 => match items.remove(0) {
                        Value::Object(row) => Ok(row),
                        other => Err(unexpected_shape(Operation::SelectOne, &other)),
                    },
                    Value::Array(items) if items.is_empty() => Err(ClientError::new(
                        ErrorKind::NotFound,
                        format!("No matching record during {}", Operation::SelectOne),
                    )),
                    other => Err(unexpected_shape(Operation::SelectOne, &other)),
                }
            })
            .await
    }

    /// Insert one row (or a batch); returns the first row written
    ///
    /// With `upsert`, rows conflicting on the primary key are replaced.
    pub async fn insert(&self, table: &str, payload: Value, upsert: bool) -> ClientResult<Option<Row>> {
        let args = CallArgs::new()
            .with("table", table)
            .with("payload", &payload)
            .with("upsert", upsert);

        self.observer
            .observe(Operation::Insert, args, async {
                let stmt = compile_insert(table, &payload, upsert)?;
                let body = self
                    .conn
                    .send_statement(&stmt)
                    .await
                    .map_err(failed(Operation::Insert))?;
                Ok(first_row(body))
            })
            .await
    }

    /// Apply `changes` to matching rows; returns the first updated row
    ///
    /// An empty `filters` list is rejected with `ErrorKind::Validation`
    /// without contacting the backend.
    pub async fn update(&self, table: &str, changes: Value, filters: &[Filter]) -> ClientResult<Option<Row>> {
        let args = CallArgs::new()
            .with("table", table)
            .with("changes", &changes)
            .with("filters", describe_filters(filters));

        self.observer
            .observe(Operation::Update, args, async {
                let stmt = compile_update(table, &changes, filters)?;
                let body = self
                    .conn
                    .send_statement(&stmt)
                    .await
                    .map_err(failed(Operation::Update))?;
                Ok(first_row(body))
            })
            .await
    }

    /// Delete matching rows; `true` when the backend reported any
    ///
    /// Like `update`, an empty `filters` list is a local `Validation` error.
    pub async fn delete(&self, table: &str, filters: &[Filter]) -> ClientResult<bool> {
        let args = CallArgs::new()
            .with("table", table)
            .with("filters", describe_filters(filters));

        self.observer
            .observe(Operation::Delete, args, async {
                let stmt = compile_delete(table, filters)?;
                let body = self
                    .conn
                    .send_statement(&stmt)
                    .await
                    .map_err(failed(Operation::Delete))?;
                Ok(matches!(&body, Value::Array(items) if !items.is_empty()))
            })
            .await
    }
}

fn rows(body: Value) -> Option<Vec<Row>> {
    match body {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

fn first_row(body: Value) -> Option<Row> {
    match body {
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        }),
        Value::Object(row) => Some(row),
        _ => None,
    }
}

fn unexpected_shape(op: Operation, body: &Value) -> ClientError {
    ClientError::new(
        ErrorKind::Query,
        format!(
            "Failed to {}: unexpected response shape {}",
            op.action(),
            crate::observability::truncate(&body.to_string(), 80)
        ),
    )
}
