mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use dreamlog::config::Overrides;
use dreamlog::logging;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(args.verbose);
    let overrides = Overrides {
        data_dir: args.data_dir,
        remote_dir: args.remote_dir,
        owner_id: args.owner,
    };
    let command = args.command.unwrap_or(cli::Command::List {
        tag: None,
        favorites: false,
    });
    match command {
        cli::Command::Init => commands::init(),
        cli::Command::List { tag, favorites } => commands::list(&overrides, tag, favorites),
        cli::Command::Add {
            title,
            description,
            tags,
            favorite,
            at,
        } => commands::add(&overrides, title, description, tags, favorite, at),
        cli::Command::Edit {
            entry,
            title,
            description,
            tags,
            clear_tags,
        } => commands::edit(&overrides, entry, title, description, tags, clear_tags),
        cli::Command::Fav { entry } => commands::favorite(&overrides, entry),
        cli::Command::Rm { entry } => commands::remove(&overrides, entry),
        cli::Command::Tags => commands::tags(&overrides),
        cli::Command::RenameTag { old, new } => commands::rename_tag(&overrides, old, new),
        cli::Command::DropTag { path } => commands::drop_tag(&overrides, path),
        cli::Command::Move { from, to } => commands::move_entry(&overrides, from, to),
        cli::Command::Sort { mode } => commands::sort(&overrides, mode),
        cli::Command::Filter { tag } => commands::filter(&overrides, tag),
        cli::Command::Sync => commands::sync(&overrides),
    }
}
