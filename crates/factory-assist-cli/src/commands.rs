//! One-shot subcommands for the admin side of the backend.
//!
//! Each command talks to the backend once, prints a plain-text report and
//! exits. Output goes to the writer passed in so the commands can be tested
//! against a buffer.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::client::BackendClient;
use crate::dashboard::{self, DashboardSummary};
use crate::types::SolveRequest;

/// Rows printed in the lifecycle detail table.
pub const TABLE_ROW_LIMIT: usize = 50;

/// Knowledge-base management.
#[derive(Debug, Subcommand)]
pub enum KbCommand {
    /// List indexed documents.
    List,
    /// Upload a document for indexing.
    Upload {
        /// File to upload.
        path: PathBuf,
    },
    /// Delete a document and everything learned from it.
    Delete {
        /// Document name as listed.
        name: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Print the preview URL of a document.
    Url {
        /// Document name as listed.
        name: String,
    },
}

/// Questions the assistant could not answer.
#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// List pending questions.
    List,
    /// Answer a pending question.
    Solve {
        /// Number shown by `pending list`, or the question text itself.
        target: String,
        /// Answer text.
        #[arg(long)]
        answer: Option<String>,
        /// File name to store the answer text under.
        #[arg(long, requires = "answer")]
        filename: Option<String>,
        /// Document holding the answer.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Lifecycle dashboard report.
#[derive(Debug, Args)]
pub struct LifecycleArgs {
    /// Production log (CSV or Excel) to analyse.
    pub path: PathBuf,
    /// Only list rows containing this text.
    #[arg(long)]
    pub search: Option<String>,
}

// =============================================================================
// Knowledge Base
// =============================================================================

/// Run a knowledge-base command. `input` answers the delete confirmation.
pub async fn run_kb(
    client: &BackendClient,
    command: KbCommand,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        KbCommand::List => {
            let files = client.list_knowledge_files().await?;
            if files.is_empty() {
                writeln!(out, "Knowledge base is empty.")?;
            }
            for file in files {
                writeln!(out, "{:<40} {:>6} chunks", file.name, file.chunks)?;
            }
        }
        KbCommand::Upload { path } => {
            let receipt = client.upload_knowledge_file(&path).await?;
            writeln!(
                out,
                "Uploaded {} ({} chunks). {}",
                receipt.filename, receipt.chunks, receipt.message
            )?;
        }
        KbCommand::Delete { name, yes } => {
            let prompt = format!("Delete \"{name}\" and all knowledge derived from it?");
            if !yes && !confirm(&prompt, input, out)? {
                writeln!(out, "Cancelled.")?;
                return Ok(());
            }
            client.delete_knowledge_file(&name).await?;
            writeln!(out, "Deleted {name}.")?;
        }
        KbCommand::Url { name } => {
            writeln!(out, "{}", client.file_url(&name)?)?;
        }
    }
    Ok(())
}

fn confirm(prompt: &str, input: &mut impl BufRead, out: &mut impl Write) -> anyhow::Result<bool> {
    write!(out, "{prompt} [y/N] ")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

// =============================================================================
// Pending Questions
// =============================================================================

/// Run a pending-question command.
pub async fn run_pending(
    client: &BackendClient,
    command: PendingCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        PendingCommand::List => {
            let list = client.unanswered_questions().await?;
            writeln!(out, "{} pending question(s)", list.count)?;
            for (i, question) in list.questions.iter().enumerate() {
                writeln!(out, "{:>3}. [{}] {}", i + 1, question.display_timestamp(), question.query)?;
                if !question.reason.is_empty() {
                    writeln!(out, "     reason: {}", question.reason)?;
                }
            }
        }
        PendingCommand::Solve {
            target,
            answer,
            filename,
            file,
        } => {
            let query = resolve_question(client, &target).await?;
            client
                .solve_question(SolveRequest {
                    query: query.clone(),
                    answer_text: answer,
                    custom_filename: filename,
                    file,
                })
                .await?;
            tracing::info!(%query, "Pending question solved");
            writeln!(out, "Answer submitted for: {query}")?;
        }
    }
    Ok(())
}

/// A number picks a listed question (1-based); anything else is the query itself.
async fn resolve_question(client: &BackendClient, target: &str) -> anyhow::Result<String> {
    let Ok(index) = target.trim().parse::<usize>() else {
        return Ok(target.to_string());
    };
    let list = client.unanswered_questions().await?;
    index
        .checked_sub(1)
        .and_then(|i| list.questions.into_iter().nth(i))
        .map(|q| q.query)
        .ok_or_else(|| anyhow::anyhow!("no pending question #{index}"))
}

// =============================================================================
// Lifecycle Dashboard
// =============================================================================

/// Upload a production log and print its dashboard.
pub async fn run_lifecycle(
    client: &BackendClient,
    args: LifecycleArgs,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let rows = client.upload_lifecycle(&args.path).await?;
    let summary = DashboardSummary::from_rows(&rows);
    print_summary(&summary, out)?;

    let term = args.search.unwrap_or_default();
    let matches = dashboard::filter_rows(&rows, &term);
    writeln!(out)?;
    writeln!(
        out,
        "Showing {} of {} matching row(s)",
        matches.len().min(TABLE_ROW_LIMIT),
        matches.len()
    )?;
    writeln!(out, "{}", dashboard::TABLE_COLUMNS.join(" | "))?;
    for row in matches.into_iter().take(TABLE_ROW_LIMIT) {
        let cells: Vec<String> = dashboard::TABLE_COLUMNS
            .iter()
            .map(|column| dashboard::cell_text(row, column))
            .collect();
        writeln!(out, "{}", cells.join(" | "))?;
    }
    Ok(())
}

fn print_summary(summary: &DashboardSummary, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Data integrity:   {:.1}%", summary.integrity)?;
    writeln!(out, "Total tasks:      {}", summary.total_tasks)?;
    writeln!(out, "Average minutes:  {:.1}", summary.average_minutes)?;
    writeln!(out, "Active stations:  {}", summary.station_count)?;

    writeln!(out)?;
    writeln!(out, "Station load (top {}):", dashboard::STATION_RANKING_LIMIT)?;
    for (station, count) in &summary.station_ranking {
        writeln!(out, "  {station:<20} {count}")?;
    }

    writeln!(out)?;
    writeln!(out, "Part types:")?;
    for (kind, count) in &summary.type_distribution {
        writeln!(out, "  {kind:<20} {count}")?;
    }

    writeln!(out)?;
    writeln!(out, "Map points: {}", summary.map_points.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn kb_list_prints_names_and_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/knowledge/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "press_manual.pdf", "chunks": 42}
            ])))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let mut out = Vec::new();
        run_kb(&client, KbCommand::List, &mut "".as_bytes(), &mut out)
            .await
            .unwrap();
        let text = output(out);
        assert!(text.contains("press_manual.pdf"));
        assert!(text.contains("42 chunks"));
    }

    #[tokio::test]
    async fn kb_delete_declined_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let mut out = Vec::new();
        let command = KbCommand::Delete {
            name: "a.pdf".to_string(),
            yes: false,
        };
        run_kb(&client, command, &mut "n\n".as_bytes(), &mut out)
            .await
            .unwrap();
        assert!(output(out).ends_with("Cancelled.\n"));
    }

    #[tokio::test]
    async fn kb_delete_confirmed_hits_backend() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/knowledge/files/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let mut out = Vec::new();
        let command = KbCommand::Delete {
            name: "a.pdf".to_string(),
            yes: false,
        };
        run_kb(&client, command, &mut "y\n".as_bytes(), &mut out)
            .await
            .unwrap();
        assert!(output(out).contains("Deleted a.pdf."));
    }

    #[tokio::test]
    async fn pending_solve_by_index_sends_listed_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/unanswered_questions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 2,
                "questions": [
                    {"query": "how to reset E-07", "reason": "no match", "timestamp": ""},
                    {"query": "torque for M8", "reason": "no match", "timestamp": ""}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/solve_question"))
            .and(body_string_contains("torque for M8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let mut out = Vec::new();
        let command = PendingCommand::Solve {
            target: "2".to_string(),
            answer: Some("25 Nm".to_string()),
            filename: None,
            file: None,
        };
        run_pending(&client, command, &mut out).await.unwrap();
        assert!(output(out).contains("Answer submitted for: torque for M8"));
    }

    #[tokio::test]
    async fn pending_solve_out_of_range_index_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/unanswered_questions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "questions": []})))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let command = PendingCommand::Solve {
            target: "1".to_string(),
            answer: Some("x".to_string()),
            filename: None,
            file: None,
        };
        let err = run_pending(&client, command, &mut Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("#1"));
    }

    #[tokio::test]
    async fn lifecycle_prints_summary_and_filtered_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload_lifecycle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {
                    "唯一编号 (Unique ID)": "P-1",
                    "最新工位 (Station)": "W1",
                    "总耗时(分钟)": 10,
                    "开始时间": "2026-03-01 08:00:00.123"
                },
                {
                    "唯一编号 (Unique ID)": "P-2",
                    "最新工位 (Station)": "W2",
                    "总耗时(分钟)": 20,
                    "开始时间": ""
                }
            ]})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.csv");
        std::fs::write(&file, "x").unwrap();

        let client = BackendClient::new(server.uri());
        let mut out = Vec::new();
        let args = LifecycleArgs {
            path: file,
            search: Some("p-1".to_string()),
        };
        run_lifecycle(&client, args, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("Data integrity:   87.5%"));
        assert!(text.contains("Total tasks:      2"));
        assert!(text.contains("Average minutes:  15.0"));
        assert!(text.contains("Showing 1 of 1 matching row(s)"));
        assert!(text.contains("P-1 | - | - | - | W1"));
        assert!(text.contains("2026-03-01 08:00:00 | -"));
        assert!(!text.contains("P-2 |"));
    }
}
