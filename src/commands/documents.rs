//! Document management commands
//!
//! Lists and deletes the documents stored by the backend for the signed-in
//! user, as a table or as JSON.

use super::{prompt_line, AppContext};
use crate::error::{RagChatError, Result};
use crate::types::DocumentRecord;

use colored::Colorize;
use prettytable::{row, Table};

/// `ragchat documents list`
///
/// # Arguments
///
/// * `ctx` - Application context
/// * `json` - Print JSON instead of a table
///
/// # Errors
///
/// Returns error when not signed in or the backend request fails
pub async fn list_documents(ctx: &AppContext, json: bool) -> Result<()> {
    ctx.require_user()?;
    tracing::info!("Listing documents");

    let documents = ctx.api.list_documents().await?;
    tracing::debug!(count = documents.len(), "Loaded documents");

    if json {
        output_documents_json(&documents)
    } else {
        output_documents_table(&documents);
        Ok(())
    }
}

/// `ragchat documents delete <id>`
///
/// Asks for confirmation unless `yes` is set.
pub async fn delete_document(ctx: &AppContext, id: i64, yes: bool) -> Result<()> {
    ctx.require_user()?;

    if !yes {
        let answer = prompt_line(&format!("Delete document {}? [y/N] ", id))?;
        if !is_confirmation(&answer) {
            println!("Cancelled");
            return Ok(());
        }
    }

    tracing::info!(id, "Deleting document");
    ctx.api.delete_document(id).await?;
    println!("{}", format!("Deleted document {}", id).green());
    Ok(())
}

/// Whether a prompt answer means yes
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn output_documents_json(documents: &[DocumentRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(documents).map_err(RagChatError::Serialization)?;
    println!("{}", json);
    Ok(())
}

/// Table of documents: id, name, upload time
pub fn documents_table(documents: &[DocumentRecord]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Id", "Name", "Uploaded"]);

    for doc in documents {
        table.add_row(row![
            doc.id,
            doc.filename,
            doc.created_at.format("%Y-%m-%d %H:%M")
        ]);
    }

    table
}

fn output_documents_table(documents: &[DocumentRecord]) {
    if documents.is_empty() {
        println!("No documents uploaded yet");
        return;
    }

    println!("\nYour documents:\n");
    documents_table(documents).printstd();
    println!();
}
