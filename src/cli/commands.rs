//! CLI command implementations
//!
//! Each command is a thin call into `BlockingClient`; the result is printed
//! as pretty JSON on stdout.

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::blocking::BlockingClient;
use crate::config::ClientConfig;
use crate::query::{Fields, Filter};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let client = connect(cli.config.as_deref())?;

    if let (Some(email), Some(password)) = (cli.email.as_deref(), cli.password.as_deref()) {
        client.login(email, password)?;
    }

    run_command(&client, cli.command)
}

/// Build a client from a config file, or from `.env` and the environment
pub fn connect(config_path: Option<&Path>) -> CliResult<BlockingClient> {
    let config = match config_path {
        Some(path) => ClientConfig::from_file(path)?,
        None => {
            dotenv::dotenv().ok();
            ClientConfig::from_env()?
        }
    };
    Ok(BlockingClient::new(config)?)
}

/// Run one command against a connected client
pub fn run_command(client: &BlockingClient, cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Select { table, fields, filters } => {
            let rows = client.select(&table, &parse_fields(fields.as_deref()), &parse_filters(&filters)?)?;
            write_json(&rows)
        }
        Command::Get { table, fields, filters } => {
            let row = client.select_one(&table, &parse_fields(fields.as_deref()), &parse_filters(&filters)?)?;
            write_json(&row)
        }
        Command::Insert { table, data, upsert } => {
            let row = client.insert(&table, parse_json_arg("--data", &data)?, upsert)?;
            write_json(&row)
        }
        Command::Update { table, data, filters } => {
            let row = client.update(&table, parse_json_arg("--data", &data)?, &parse_filters(&filters)?)?;
            write_json(&row)
        }
        Command::Delete { table, filters } => {
            let deleted = client.delete(&table, &parse_filters(&filters)?)?;
            write_json(&serde_json::json!({ "deleted": deleted }))
        }
        Command::Rpc { function, params } => {
            let params = match params {
                Some(raw) => parse_json_arg("--params", &raw)?,
                None => Value::Null,
            };
            write_json(&client.rpc(&function, params)?)
        }
        Command::Buckets => write_json(&client.list_buckets()?),
        Command::Files { bucket, prefix } => write_json(&client.list_files(&bucket, prefix.as_deref())?),
        Command::User => write_json(&client.get_user()?),
    }
}

/// `None` or `*` selects every column
pub fn parse_fields(raw: Option<&str>) -> Fields {
    match raw.map(str::trim) {
        None | Some("") | Some("*") => Fields::All,
        Some(list) => Fields::columns(list.split(',').map(str::trim)),
    }
}

pub fn parse_filters(raw: &[String]) -> CliResult<Vec<Filter>> {
    raw.iter().map(|f| parse_filter(f)).collect()
}

/// Parse `column:operator:value`; the value may itself contain `:`
pub fn parse_filter(raw: &str) -> CliResult<Filter> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(column), Some(operator), Some(value)) => {
            Ok(Filter::parse(column.trim(), operator.trim(), parse_filter_value(value))?)
        }
        _ => Err(CliError::input_error(format!(
            "Filter must look like column:operator:value, got '{}'",
            raw
        ))),
    }
}

/// Parse a filter value: JSON when it parses, `(a,b,c)` lists, else a string
pub fn parse_filter_value(value: &str) -> Value {
    if value.starts_with('(') && value.ends_with(')') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        let items = inner
            .split(',')
            .map(|item| parse_filter_value(item.trim()))
            .collect();
        return Value::Array(items);
    }

    match serde_json::from_str::<Value>(value) {
        Ok(parsed) => parsed,
        Err(_) => Value::String(value.to_string()),
    }
}

fn parse_json_arg(flag: &str, raw: &str) -> CliResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| CliError::input_error(format!("{} is not valid JSON: {}", flag, e)))
}

/// Write a value to stdout as pretty JSON
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::query::FilterOperator;
    use serde_json::json;

    use super::super::errors::CliErrorCode;

    #[test]
    fn test_parse_filter_value() {
        assert_eq!(parse_filter_value("42"), json!(42));
        assert_eq!(parse_filter_value("2.5"), json!(2.5));
        assert_eq!(parse_filter_value("true"), json!(true));
        assert_eq!(parse_filter_value("null"), Value::Null);
        assert_eq!(parse_filter_value("widget"), json!("widget"));
        assert_eq!(parse_filter_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_filter_value("(a, 2, b)"), json!(["a", 2, "b"]));
    }

    #[test]
    fn test_parse_filter_keeps_colons_in_value() {
        let filter = parse_filter("created_at:gte:2024-01-01T00:00:00Z").unwrap();
        assert_eq!(filter.column, "created_at");
        assert_eq!(filter.operator, FilterOperator::Gte);
        assert_eq!(filter.value, json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_parse_filter_rejects_bad_input() {
        let err = parse_filter("id=1").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::InputError);

        let err = parse_filter("id:between:1").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::Client(ErrorKind::Validation));
        assert_eq!(err.message(), "Unsupported operator: between");
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(parse_fields(None), Fields::All);
        assert_eq!(parse_fields(Some("*")), Fields::All);
        assert_eq!(parse_fields(Some("id, name")), Fields::columns(["id", "name"]));
    }
}
