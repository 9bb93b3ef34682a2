//! The `quizbot validate` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::{Cell, Table};

use quizbot_core::parser::{validate_question_set, Markers};
use quizbot_core::source::FileQuestionSource;
use quizbot_core::traits::QuestionSource;

pub fn execute(path: PathBuf, encoding: String, markers: &Markers) -> Result<()> {
    let files = if path.is_dir() {
        FileQuestionSource::list_files(&path)?
    } else if path.is_file() {
        vec![path.clone()]
    } else {
        anyhow::bail!("question path not found: {}", path.display());
    };
    anyhow::ensure!(
        !files.is_empty(),
        "no .txt question files in {}",
        path.display()
    );

    let source = FileQuestionSource::new(&encoding, markers)?;

    let mut table = Table::new();
    table.set_header(vec!["File", "Questions", "Warnings"]);

    let mut total_questions = 0;
    let mut total_warnings = 0;
    let mut details = Vec::new();

    for file in &files {
        let set = source.load(std::slice::from_ref(file))?;
        let mut warnings: Vec<String> = validate_question_set(&set)
            .into_iter()
            .map(|w| format!("[{}] {}", w.index, w.message))
            .collect();
        if set.is_empty() {
            warnings.push("no questions found".to_string());
        }

        table.add_row(vec![
            Cell::new(display_name(file)),
            Cell::new(set.len()),
            Cell::new(warnings.len()),
        ]);

        total_questions += set.len();
        total_warnings += warnings.len();
        details.push((display_name(file), warnings));
    }

    println!("{table}");

    for (file, warnings) in &details {
        for w in warnings {
            println!("  {file} WARNING: {w}");
        }
    }

    println!("\n{} file(s), {total_questions} question(s).", files.len());
    if total_warnings == 0 {
        println!("All question files valid.");
    } else {
        println!("{total_warnings} warning(s) found.");
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
