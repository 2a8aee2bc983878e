//! Full-path length enforcement.
//!
//! Objects are addressed on the target as `/<tenant>/<application>/<item>`,
//! and the target refuses names longer than [`MAX_PATH_LENGTH`] characters.

use serde_json::{Map, Value};

use crate::errors::{AdcError, Result};

pub const MAX_PATH_LENGTH: usize = 255;

/// Fail with [`AdcError::PathLength`] when any addressable path is too long.
pub fn validate_path_length(declaration: &Value) -> Result<()> {
    let Value::Object(root) = declaration else {
        return Ok(());
    };

    for (tenant_name, tenant) in children_of_class(root, "Tenant") {
        let tenant_path = format!("/{}", tenant_name);
        check(&tenant_path)?;

        for (app_name, app) in children_of_class(tenant, "Application") {
            let app_path = format!("{}/{}", tenant_path, app_name);
            check(&app_path)?;

            for (item_name, _) in app.iter().filter(|(_, value)| value.is_object()) {
                check(&format!("{}/{}", app_path, item_name))?;
            }
        }
    }

    Ok(())
}

fn children_of_class<'a>(
    parent: &'a Map<String, Value>,
    class: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Map<String, Value>)> + 'a {
    parent.iter().filter_map(move |(name, value)| {
        let object = value.as_object()?;
        (object.get("class").and_then(Value::as_str) == Some(class)).then_some((name, object))
    })
}

fn check(path: &str) -> Result<()> {
    if path.chars().count() > MAX_PATH_LENGTH {
        tracing::error!(path_length = path.chars().count(), "declaration path is too long");
        return Err(AdcError::PathLength { path: path.to_string() });
    }
    Ok(())
}
