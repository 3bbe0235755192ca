//! Common test utilities and helpers.

use indoc::indoc;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use trellis::collection::{Node, Session, TestFunction, TestRegistry, TestSuite};
use trellis::config::Config;
use trellis::mark::MarkFactory;

/// Creates a temporary directory with the given files.
///
/// # Arguments
///
/// * `files` - A HashMap where keys are file paths (relative to project root) and values are file contents
///
/// # Returns
///
/// A tuple of (TempDir, PathBuf) where TempDir is the temporary directory handle
/// and PathBuf is the path to the project directory inside it.
#[allow(dead_code)]
pub fn create_test_project_with_files(files: HashMap<&str, &str>) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    // A subdirectory whose name does not start with a dot
    let project_path = temp_dir.path().join("test_project");
    fs::create_dir_all(&project_path).expect("Failed to create project directory");

    for (file_path, content) in files {
        let full_path = project_path.join(file_path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        let mut file = fs::File::create(&full_path)
            .unwrap_or_else(|e| panic!("Failed to create file {file_path}: {e}"));
        file.write_all(content.as_bytes())
            .unwrap_or_else(|e| panic!("Failed to write file {file_path}: {e}"));
    }

    let project_path = project_path
        .canonicalize()
        .expect("Failed to canonicalize project directory");
    (temp_dir, project_path)
}

/// Creates a test project with a single file.
#[allow(dead_code)]
pub fn create_test_file(filename: &str, content: &str) -> (TempDir, PathBuf) {
    let mut files = HashMap::new();
    files.insert(filename, content);
    create_test_project_with_files(files)
}

/// The sample project used by most collection tests:
///
/// ```text
/// test_sample.rs        test_simple, test_another, Calculator::{test_add, test_sub}
/// pkg/test_math.rs      test_math_operations
/// pkg/helpers.rs        (not a test file)
/// target/test_built.rs  (never recursed into)
/// .hidden/test_x.rs     (never recursed into)
/// ```
#[allow(dead_code)]
pub fn create_test_project() -> (TempDir, PathBuf) {
    let source = indoc! {r#"
        // test bodies are registered in code, the file only has to exist
        fn test_simple() {}
    "#};

    let mut files = HashMap::new();
    files.insert("test_sample.rs", source);
    files.insert("pkg/test_math.rs", source);
    files.insert("pkg/helpers.rs", "fn helper() {}\n");
    files.insert("target/test_built.rs", source);
    files.insert(".hidden/test_x.rs", source);
    create_test_project_with_files(files)
}

/// Registry matching [`create_test_project`].
#[allow(dead_code)]
pub fn sample_registry(factory: &MarkFactory) -> TestRegistry {
    let slow = factory.get("slow").expect("slow marker");
    let db = factory.get("db").expect("db marker");

    let mut registry = TestRegistry::new();
    registry
        .add("test_sample.rs", TestFunction::new("test_simple", || Ok(())).at_line(3))
        .add(
            "test_sample.rs",
            slow.apply(TestFunction::new("test_another", || Ok(())).at_line(7))
                .expect("apply slow"),
        )
        .add(
            "test_sample.rs",
            db.apply(
                TestSuite::new("Calculator")
                    .with_test(TestFunction::new("test_add", || Ok(())).at_line(12))
                    .with_test(
                        slow.apply(TestFunction::new("test_sub", || Ok(())).at_line(15))
                            .expect("apply slow"),
                    ),
            )
            .expect("apply db"),
        )
        .add(
            "pkg/test_math.rs",
            TestFunction::new("test_math_operations", || Ok(())),
        )
        .add("pkg/helpers.rs", TestFunction::new("test_in_helper", || Ok(())))
        .add("target/test_built.rs", TestFunction::new("test_built", || Ok(())));
    registry
}

/// A session rooted at `project_path` and started from there.
#[allow(dead_code)]
pub fn session_for(project_path: &Path, registry: TestRegistry) -> Rc<Session> {
    session_with(Config::new(project_path, project_path), registry)
}

#[allow(dead_code)]
pub fn session_with(config: Config, registry: TestRegistry) -> Rc<Session> {
    Session::from_config(config, registry).expect("Failed to create session")
}

/// Collect with the configured arguments and return the item node ids.
#[allow(dead_code)]
pub fn collected_ids(session: &Rc<Session>, args: Option<&[String]>) -> Vec<String> {
    let (items, notfound) = session.perform_collect(args).expect("collection failed");
    assert!(notfound.is_empty(), "Unexpected unresolved arguments: {notfound:#?}");
    items.iter().map(|item| item.nodeid().to_string()).collect()
}

#[allow(dead_code)]
pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
