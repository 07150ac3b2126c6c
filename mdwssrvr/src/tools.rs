//! # Standard Tools
//!
//! Filesystem primitives and arithmetic bound to the tool interface.
//! Each handler checks its capability flag first, then runs every path it
//! touches through the sandbox predicate. Handlers only ever see the
//! narrow [`ToolContext`]; none of them know about the server facade.

use serde_json::{json, Value};
use std::fs;

use crate::registry::{ToolArgs, ToolContext, ToolDefinition, ToolError};
use crate::server::McpServer;

/// Registers the standard tool set. Nothing is enabled here; the enabled
/// set comes from configuration.
pub fn register_standard_tools(server: &mut McpServer) {
    server.add_tool(
        "read_file",
        ToolDefinition {
            description: "Reads the content of a file. Requires Read Files.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"}
                },
                "required": ["path"]
            }),
            handler: Box::new(read_file),
        },
    );
    server.add_tool(
        "write_file",
        ToolDefinition {
            description: "Writes data to a file. Requires Write Files.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"},
                    "data": {"type": "string", "description": "Content to write"}
                },
                "required": ["path", "data"]
            }),
            handler: Box::new(write_file),
        },
    );
    server.add_tool(
        "create_dir",
        ToolDefinition {
            description: "Creates a directory. Requires Create Directories.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory path"}
                },
                "required": ["path"]
            }),
            handler: Box::new(create_dir),
        },
    );
    server.add_tool(
        "list_dir",
        ToolDefinition {
            description: "Lists directory contents. Requires Search Directories.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory path", "default": "."}
                }
            }),
            handler: Box::new(list_dir),
        },
    );
    server.add_tool(
        "delete_file",
        ToolDefinition {
            description: "Deletes a file. Requires Delete Files.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"}
                },
                "required": ["path"]
            }),
            handler: Box::new(delete_file),
        },
    );
    server.add_tool(
        "calculate",
        ToolDefinition {
            description: "Performs basic arithmetic on two numbers.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "a": {"type": "number"},
                    "b": {"type": "number"},
                    "operation": {
                        "type": "string",
                        "enum": ["add", "subtract", "multiply", "divide"]
                    }
                },
                "required": ["a", "b", "operation"]
            }),
            handler: Box::new(calculate),
        },
    );
}

fn require_str<'a>(args: &'a ToolArgs, key: &str, tool: &str) -> Result<&'a str, ToolError> {
    match args.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ToolError::InvalidArgument(format!(
            "'{key}' is a required string argument for '{tool}'"
        ))),
    }
}

fn require_number(args: &ToolArgs, key: &str, tool: &str) -> Result<f64, ToolError> {
    args.get(key).and_then(Value::as_f64).ok_or_else(|| {
        ToolError::InvalidArgument(format!("'{key}' must be a number for '{tool}'"))
    })
}

fn read_file(ctx: &ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
    if !ctx.permissions.read_files {
        return Err(ToolError::PermissionDenied(
            "Read Files permission is required for 'read_file'".to_string(),
        ));
    }
    let path = require_str(args, "path", "read_file")?;
    ctx.enforce_sandbox(path)?;
    let content = fs::read_to_string(path).map_err(|e| {
        ToolError::Failed(format!("File error: could not read '{path}': {e}"))
    })?;
    Ok(Value::String(content))
}

fn write_file(ctx: &ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
    if !ctx.permissions.write_files {
        return Err(ToolError::PermissionDenied(
            "Write Files permission is required for 'write_file'".to_string(),
        ));
    }
    let path = require_str(args, "path", "write_file")?;
    let data = args
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ToolError::InvalidArgument(
                "'data' is a required string argument for 'write_file'".to_string(),
            )
        })?;
    ctx.enforce_sandbox(path)?;
    fs::write(path, data).map_err(|e| {
        ToolError::Failed(format!("File error: could not write '{path}': {e}"))
    })?;
    Ok(json!({ "bytesWritten": data.len() }))
}

fn create_dir(ctx: &ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
    if !ctx.permissions.create_dirs {
        return Err(ToolError::PermissionDenied(
            "Create Directories permission is required for 'create_dir'".to_string(),
        ));
    }
    let path = require_str(args, "path", "create_dir")?;
    ctx.enforce_sandbox(path)?;
    fs::create_dir_all(path).map_err(|e| {
        ToolError::Failed(format!("File error: could not create directory '{path}': {e}"))
    })?;
    Ok(json!({ "created": path }))
}

fn list_dir(ctx: &ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
    if !ctx.permissions.search_dirs {
        return Err(ToolError::PermissionDenied(
            "Search Directories permission is required for 'list_dir'".to_string(),
        ));
    }
    let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
    ctx.enforce_sandbox(path)?;
    let reader = fs::read_dir(path).map_err(|e| {
        ToolError::Failed(format!("File error: could not list '{path}': {e}"))
    })?;

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| {
            ToolError::Failed(format!("File error: could not list '{path}': {e}"))
        })?;
        let metadata = entry.metadata().ok();
        let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "type": if is_dir { "dir" } else { "file" },
            "size": metadata.map(|m| m.len()).unwrap_or(0),
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(Value::Array(entries))
}

fn delete_file(ctx: &ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
    if !ctx.permissions.delete_files {
        return Err(ToolError::PermissionDenied(
            "Delete Files permission is required for 'delete_file'".to_string(),
        ));
    }
    let path = require_str(args, "path", "delete_file")?;
    ctx.enforce_sandbox(path)?;
    fs::remove_file(path).map_err(|e| {
        ToolError::Failed(format!("File error: could not delete '{path}': {e}"))
    })?;
    Ok(json!({ "deleted": path }))
}

fn calculate(ctx: &ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
    let a = require_number(args, "a", "calculate")?;
    let b = require_number(args, "b", "calculate")?;
    let operation = require_str(args, "operation", "calculate")?;
    ctx.log(&format!("calculate: {a} {operation} {b}"));
    let result = match operation {
        "add" => a + b,
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" => {
            if b == 0.0 {
                return Err(ToolError::Failed(
                    "Arithmetic error: division by zero in 'calculate'".to_string(),
                ));
            }
            a / b
        }
        other => {
            return Err(ToolError::InvalidArgument(format!(
                "unknown operation '{other}' for 'calculate'. Supported: add, subtract, multiply, divide"
            )))
        }
    };
    Ok(json!(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdws_policy::{Permissions, SandboxSet};
    use std::path::Path;
    use tempfile::tempdir;

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    struct Fixture {
        permissions: Permissions,
        sandbox: SandboxSet,
    }

    impl Fixture {
        fn permissive(root: &Path) -> Fixture {
            let mut sandbox = SandboxSet::new();
            sandbox.add(root);
            Fixture {
                permissions: Permissions {
                    read_files: true,
                    write_files: true,
                    delete_files: true,
                    create_dirs: true,
                    search_dirs: true,
                    ..Default::default()
                },
                sandbox,
            }
        }

        fn run(
            &self,
            handler: fn(&ToolContext<'_>, &ToolArgs) -> Result<Value, ToolError>,
            args: &ToolArgs,
        ) -> Result<Value, ToolError> {
            let log = |_: &str| {};
            let ctx = ToolContext::new(&self.permissions, &self.sandbox, &log);
            handler(&ctx, args)
        }
    }

    #[test]
    fn read_file_requires_permission() {
        let dir = tempdir().unwrap();
        let mut fixture = Fixture::permissive(dir.path());
        fixture.permissions.read_files = false;
        let err = fixture
            .run(read_file, &args(&[("path", json!("/any"))]))
            .unwrap_err();
        assert!(err.to_string().starts_with("Permission denied:"));
    }

    #[test]
    fn read_file_returns_content_inside_sandbox() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        fs::write(&file, "hello tools").unwrap();
        let fixture = Fixture::permissive(dir.path());
        let result = fixture
            .run(read_file, &args(&[("path", json!(file.to_str().unwrap()))]))
            .unwrap();
        assert_eq!(result, json!("hello tools"));
    }

    #[test]
    fn read_file_outside_sandbox_is_a_violation() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::permissive(dir.path());
        let err = fixture
            .run(read_file, &args(&[("path", json!("/etc/shadow"))]))
            .unwrap_err();
        assert!(err.to_string().starts_with("Sandbox violation:"));
    }

    #[test]
    fn write_then_delete_round_trip() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("out.txt");
        let path = json!(file.to_str().unwrap());
        let fixture = Fixture::permissive(dir.path());

        let result = fixture
            .run(
                write_file,
                &args(&[("path", path.clone()), ("data", json!("payload"))]),
            )
            .unwrap();
        assert_eq!(result, json!({"bytesWritten": 7}));
        assert_eq!(fs::read_to_string(&file).unwrap(), "payload");

        fixture
            .run(delete_file, &args(&[("path", path)]))
            .unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn write_file_requires_data_argument() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::permissive(dir.path());
        let err = fixture
            .run(write_file, &args(&[("path", json!("x.txt"))]))
            .unwrap_err();
        assert!(err.to_string().contains("'data'"));
    }

    #[test]
    fn create_dir_realizes_nested_paths() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        let fixture = Fixture::permissive(dir.path());
        fixture
            .run(
                create_dir,
                &args(&[("path", json!(nested.to_str().unwrap()))]),
            )
            .unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn list_dir_reports_entries_sorted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let fixture = Fixture::permissive(dir.path());
        let result = fixture
            .run(
                list_dir,
                &args(&[("path", json!(dir.path().to_str().unwrap()))]),
            )
            .unwrap();
        let listing = result.as_array().unwrap();
        assert_eq!(listing.len(), 3);
        assert_eq!(listing[0]["name"], "a.txt");
        assert_eq!(listing[0]["type"], "file");
        assert_eq!(listing[1]["size"], 2);
        assert_eq!(listing[2]["name"], "sub");
        assert_eq!(listing[2]["type"], "dir");
    }

    #[test]
    fn calculate_covers_all_operations() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::permissive(dir.path());
        let call = |a: f64, b: f64, op: &str| {
            fixture.run(
                calculate,
                &args(&[("a", json!(a)), ("b", json!(b)), ("operation", json!(op))]),
            )
        };
        assert_eq!(call(2.0, 3.0, "add").unwrap(), json!(5.0));
        assert_eq!(call(2.0, 3.0, "subtract").unwrap(), json!(-1.0));
        assert_eq!(call(2.0, 3.0, "multiply").unwrap(), json!(6.0));
        assert_eq!(call(9.0, 3.0, "divide").unwrap(), json!(3.0));

        let err = call(1.0, 0.0, "divide").unwrap_err();
        assert!(err.to_string().contains("division by zero"));
        let err = call(1.0, 2.0, "modulo").unwrap_err();
        assert!(err.to_string().contains("unknown operation"));
    }

    #[test]
    fn calculate_rejects_non_numeric_arguments() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::permissive(dir.path());
        let err = fixture
            .run(
                calculate,
                &args(&[
                    ("a", json!("one")),
                    ("b", json!(2)),
                    ("operation", json!("add")),
                ]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("'a' must be a number"));
    }
}
