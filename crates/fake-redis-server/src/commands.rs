use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use crate::resp::Value;

/// In-memory keyspace shared by every client.
#[derive(Debug, Clone, Default)]
pub(crate) struct Store {
    entries: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl Store {
    /// Executes one command, given as the array of bulk strings sent by the client.
    pub(crate) fn execute(&self, request: Value) -> Value {
        let Some(args) = command_args(request) else {
            return Value::Error("ERR Protocol error: expected an array of bulk strings".to_owned());
        };

        let Some((name, args)) = args.split_first() else {
            return Value::Error("ERR empty command".to_owned());
        };

        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        match (name.as_str(), args) {
            ("PING", []) => Value::Simple("PONG".to_owned()),
            ("PING", [message]) | ("ECHO", [message]) => Value::bulk(message.clone()),
            ("SET", [key, value]) => {
                self.entries.lock().insert(key.clone(), value.clone());
                Value::ok()
            }
            ("GET", [key]) => match self.entries.lock().get(key) {
                Some(value) => Value::bulk(value.clone()),
                None => Value::nil(),
            },
            ("DEL", keys) | ("EXISTS", keys) if !keys.is_empty() => {
                let mut entries = self.entries.lock();
                let count = if name == "DEL" {
                    keys.iter().filter(|key| entries.remove(*key).is_some()).count()
                } else {
                    keys.iter().filter(|key| entries.contains_key(*key)).count()
                };
                Value::Integer(i64::try_from(count).unwrap_or(i64::MAX))
            }
            ("DBSIZE", []) => Value::Integer(i64::try_from(self.entries.lock().len()).unwrap_or(i64::MAX)),
            ("FLUSHALL", []) | ("FLUSHDB", []) => {
                self.entries.lock().clear();
                Value::ok()
            }
            // Clients announce themselves with `CLIENT SETINFO` right after connecting.
            ("CLIENT", [subcommand, ..]) if subcommand.eq_ignore_ascii_case(b"SETINFO") => Value::ok(),
            ("CLIENT", [subcommand, ..]) => Value::Error(format!(
                "ERR unknown subcommand '{}'",
                String::from_utf8_lossy(subcommand)
            )),
            ("PING" | "ECHO" | "SET" | "GET" | "DEL" | "EXISTS" | "DBSIZE" | "FLUSHALL" | "FLUSHDB" | "CLIENT", _) => Value::Error(
                format!("ERR wrong number of arguments for '{}' command", name.to_ascii_lowercase()),
            ),
            _ => Value::Error(format!("ERR unknown command '{name}'")),
        }
    }
}

fn command_args(request: Value) -> Option<Vec<Vec<u8>>> {
    let Value::Array(Some(items)) = request else {
        return None;
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Bulk(Some(data)) => Some(data),
            _ => None,
        })
        .collect()
}
