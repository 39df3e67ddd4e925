use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tokio::runtime::Runtime;

use bakerinn_server::market::{ListingId, LoginRequest, NewUser, UserId};
use bakerinn_server::{Marketplace, SqliteMarketStore};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    #[clap(value_parser = parse_path)]
    pub path: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Shows id, username and email of every user.
    ListUsers,

    /// Shows a user and its listing references.
    ShowUser { user_id: String },

    /// Registers a user, same checks as the HTTP endpoint.
    AddUser {
        email: String,
        username: String,
        password: String,
    },

    /// Deletes a user, its listings are kept.
    DeleteUser { user_id: String },

    /// Verifies the password of the user with the given email, it doesn't
    /// create any session, it just compares the password hash.
    CheckPassword { email: String, password: String },

    /// Shows every listing with its state.
    ListListings,

    /// Shows a listing along with its owner.
    ShowListing { listing_id: String },

    /// Shows the path of the current market db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn execute_command(
    line: String,
    runtime: &Runtime,
    marketplace: &Marketplace,
    db_path: String,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            println!("{} {}", PROMPT, &line);
            match cli.command {
                InnerCommand::ListUsers => match runtime.block_on(marketplace.get_all_users()) {
                    Ok(users) => {
                        if users.is_empty() {
                            println!("(no users)");
                        }
                        for user in users.iter() {
                            println!("{}  {}  <{}>", user.id, user.username, user.email);
                        }
                    }
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::ShowUser { user_id } => {
                    match runtime.block_on(marketplace.get_user(&UserId(user_id))) {
                        Ok(user) => println!("{:#?}", user),
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::AddUser {
                    email,
                    username,
                    password,
                } => {
                    let new_user = NewUser {
                        email,
                        username,
                        password,
                    };
                    match runtime.block_on(marketplace.create_user(new_user)) {
                        Ok(user) => println!("Created user {} ({})", user.username, user.id),
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::DeleteUser { user_id } => {
                    if let Err(err) = runtime.block_on(marketplace.delete_user(&UserId(user_id))) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                }
                InnerCommand::CheckPassword { email, password } => {
                    let msg = match runtime
                        .block_on(marketplace.login(LoginRequest { email, password }))
                    {
                        Ok(outcome) if outcome.matched => {
                            "The password provided is correct!".to_string()
                        }
                        Ok(_) => "Wrong password.".to_string(),
                        Err(err) => format!(
                            "Could not verify the password, something went wrong: {}",
                            err
                        ),
                    };
                    println!("{}", msg);
                }
                InnerCommand::ListListings => {
                    match runtime.block_on(marketplace.get_all_listings()) {
                        Ok(listings) => {
                            if listings.is_empty() {
                                println!("(no listings)");
                            }
                            for listing in listings.iter() {
                                println!(
                                    "{}  [{}]  {}  (owner {})",
                                    listing.id, listing.state, listing.title, listing.owner_id
                                );
                            }
                        }
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::ShowListing { listing_id } => {
                    match runtime.block_on(marketplace.get_listing(&ListingId(listing_id))) {
                        Ok(listing) => println!("{:#?}", listing),
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::Where => {
                    println!("{}", db_path);
                }
                InnerCommand::Exit => return CommandExecutionResult::Exit,
            }
        }

        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let db_path = match cli_args.path {
        Some(path) => path,
        None => SqliteMarketStore::infer_path().with_context(|| {
            "Could not infer the market DB file path, please specify it explicitly."
        })?,
    };
    let store = SqliteMarketStore::new(&db_path)?;
    let marketplace = Marketplace::new(Arc::new(store));
    let runtime = Runtime::new()?;

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MyHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(MyHelper::new()));

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(
                    line,
                    &runtime,
                    &marketplace,
                    db_path.display().to_string(),
                ) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        eprintln!("Error: {}", err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}
