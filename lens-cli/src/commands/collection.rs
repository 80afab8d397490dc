//! Collection command handlers
//!
//! Uploads local documents as a named backend collection, lists the
//! collections that research requests can search and deletes them.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;

use crate::attachments::read_attachments;
use crate::config::Config;

/// Collection subcommands
#[derive(Subcommand)]
pub enum CollectionCommands {
    /// Upload files as a new collection
    Upload {
        /// Collection name
        name: String,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List existing collections
    List,
    /// Delete a collection and its files
    Delete {
        /// Collection ID
        id: String,
    },
}

/// Handle collection commands
pub async fn handle_collection_command(command: CollectionCommands, config: &Config) -> Result<()> {
    let controller = config.controller(false)?;

    match command {
        CollectionCommands::Upload { name, files } => {
            let attachments = read_attachments(&files).await?;
            println!(
                "{}",
                format!("Uploading {} file(s) to '{}'...", attachments.len(), name).dimmed()
            );

            let id = controller.upload_files(&name, &attachments).await?;

            println!("{}", "✓ Collection created".green());
            println!("  ID:   {}", id.cyan());
            println!("  Name: {}", name);
            println!();
            println!(
                "{}",
                format!("Use it with: lens research --collection {} ...", id).dimmed()
            );
            Ok(())
        }
        CollectionCommands::List => {
            let collections = controller.list_collections().await?;

            if collections.is_empty() {
                println!("{}", "No collections found.".yellow());
                return Ok(());
            }

            println!(
                "{}",
                format!("Found {} collection(s):", collections.len()).bold()
            );
            println!();
            for collection in collections {
                println!("  {} {}", "▸".cyan(), collection.name.bold());
                println!("    ID:      {}", collection.id.dimmed());
                println!("    Files:   {}", collection.file_count);
                println!(
                    "    Created: {}",
                    collection
                        .created_at
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                        .dimmed()
                );
                println!();
            }
            Ok(())
        }
        CollectionCommands::Delete { id } => {
            controller.delete_collection(&id).await?;
            println!("{}", format!("✓ Collection {} deleted", id).green());
            Ok(())
        }
    }
}
