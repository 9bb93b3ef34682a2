//! The `quizbot init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("quizbot.toml").exists() {
        println!("quizbot.toml already exists, skipping.");
    } else {
        std::fs::write("quizbot.toml", SAMPLE_CONFIG)?;
        println!("Created quizbot.toml");
    }

    std::fs::create_dir_all("questions")?;
    let sample_path = std::path::Path::new("questions/sample.txt");
    if sample_path.exists() {
        println!("questions/sample.txt already exists, skipping.");
    } else {
        std::fs::write(sample_path, SAMPLE_QUESTIONS)?;
        println!("Created questions/sample.txt");
    }

    println!("\nNext steps:");
    println!("  1. Put your question archives into questions/");
    println!("  2. Run: quizbot validate --questions questions --encoding utf-8");
    println!("  3. Run: quizbot run --transport console");
    println!("  4. Set TG_BOT_API_KEY or VK_API_KEY and run with --transport telegram|vk");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizbot configuration

parallelism = 8
poll_timeout_secs = 25

[telegram]
token = "${TG_BOT_API_KEY}"

[vk]
token = "${VK_API_KEY}"
group_id = 0

[store]
type = "memory"
# type = "redis"
# host = "127.0.0.1"
# port = 6379
# db = 0
# password = "${REDIS_PASSWORD}"

[questions]
directory = "questions"
files_per_quiz = 1
# Classic archives are KOI8-R; the sample file is UTF-8.
encoding = "utf-8"

[alerts]
# developer_chat_id = 123456789
"#;

const SAMPLE_QUESTIONS: &str = "\
Чемпионат для примера.

Вопрос 1:
Какой город называют городом на Неве?
Ответ:
Санкт-Петербург.

Вопрос 2:
Сколько будет шесть умножить на семь?
Ответ:
42 (ответ на главный вопрос).
Комментарий:
Дуглас Адамс.

Вопрос 3:
Самая высокая гора мира?
Ответ:
Эверест.
";
