use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::codegen::ClassCompiler;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::parser::{lift_class, Parser};

/// Compiles the bytes read from `reader` for a class named `class_name`
/// into VM text, or the first error encountered (spec §6's core entry
/// point, `compile(reader, className) -> (vm_text, error)`).
pub fn compile<R: std::io::BufRead>(reader: R, class_name: &str) -> Result<String, CompileError> {
    let tokens = Lexer::lex(reader)?;
    let tree = Parser::parse_class(tokens)?;
    let class = lift_class(&tree)?;
    if class.name != class_name {
        warn!(
            "class name {} does not match file name {}",
            class.name, class_name
        );
    }
    ClassCompiler::new(&class)?.compile()
}

/// One failed file's diagnostic, carrying enough context for the driver's
/// summary (spec §6/§7).
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: CompileError,
}

/// Walks `dir` for `*.jack` files and compiles each independently, writing
/// `<basename>.vm` next to the source (or under `output_dir` if given).
/// A failing file is reported but does not stop the remaining files from
/// being attempted (spec's "partial-failure isolation" supplement).
pub fn compile_dir(dir: &Path, output_dir: Option<&Path>) -> Vec<FileFailure> {
    let mut sources = Vec::new();
    collect_jack_files(dir, &mut sources);

    let mut failures = Vec::new();
    for source in sources {
        debug!("compiling {}", source.display());
        if let Err(error) = compile_file(&source, output_dir) {
            warn!("{} failed: {}", source.display(), error);
            failures.push(FileFailure {
                path: source,
                error,
            });
        }
    }
    failures
}

fn collect_jack_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_jack_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "jack") {
            out.push(path);
        }
    }
}

fn compile_file(path: &Path, output_dir: Option<&Path>) -> Result<(), CompileError> {
    let class_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let file = fs::File::open(path)?;
    let vm_text = compile(BufReader::new(file), &class_name)?;

    let dest_dir = output_dir.unwrap_or_else(|| path.parent().unwrap_or(Path::new(".")));
    let dest = dest_dir.join(format!("{}.vm", class_name));
    fs::write(&dest, vm_text)?;
    debug!("wrote {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn compile_produces_vm_text_for_valid_source() {
        let vm = compile(Cursor::new("class C { function int zero() { return 0; } }"), "C").unwrap();
        assert_eq!(vm, "function C.zero 0\npush constant 0\nreturn");
    }

    #[test]
    fn compile_propagates_the_first_error() {
        let err = compile(Cursor::new("class C { "), "C").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }

    #[test]
    fn compile_dir_isolates_failures_across_files() {
        let tmp = std::env::temp_dir().join(format!(
            "classvm-driver-test-{}",
            std::process::id()
        ));
        fs::create_dir_all(&tmp).unwrap();
        fs::write(
            tmp.join("Good.jack"),
            "class Good { function int zero() { return 0; } }",
        )
        .unwrap();
        fs::write(tmp.join("Bad.jack"), "class Bad { ").unwrap();

        let failures = compile_dir(&tmp, None);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path.file_name().unwrap(), "Bad.jack");
        assert!(tmp.join("Good.vm").exists());
        assert!(!tmp.join("Bad.vm").exists());

        fs::remove_dir_all(&tmp).ok();
    }
}
