use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use admin_core::{GestureConfig, GestureDetector, ReorderOutcome};
use anyhow::Result;
use clap::Parser;
use client_core::{ClientError, StorefrontClient};
use shared::{
    domain::{Collection, ProductId, TestimonialId},
    protocol::PageData,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::warn;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Tap,
    Login(String),
    Logout,
    List,
    Move {
        collection: Collection,
        from: usize,
        to: usize,
    },
    Delete {
        collection: Collection,
        id: i64,
    },
    Quit,
}

/// `login` only parses once the hidden gesture has unlocked admin mode;
/// before that it reads as any other unknown word.
fn parse_command(line: &str, unlocked: bool) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();
    let number = |raw: &str, what: &str| {
        raw.parse::<i64>()
            .map_err(|_| format!("{what} must be a number, got '{raw}'"))
    };

    match (verb, rest.as_slice()) {
        ("tap", []) => Ok(Command::Tap),
        ("login", [password]) if unlocked => Ok(Command::Login((*password).to_string())),
        ("logout", []) => Ok(Command::Logout),
        ("list", []) => Ok(Command::List),
        ("move", [collection, from, to]) => Ok(Command::Move {
            collection: collection.parse()?,
            from: number(from, "from")?.try_into().map_err(|_| "from must not be negative".to_string())?,
            to: number(to, "to")?.try_into().map_err(|_| "to must not be negative".to_string())?,
        }),
        ("delete", [collection, id]) => Ok(Command::Delete {
            collection: collection.parse()?,
            id: number(id, "id")?,
        }),
        ("quit" | "exit", []) => Ok(Command::Quit),
        ("", _) => Err("empty command".into()),
        _ => Err(format!(
            "unrecognized '{}'; try tap, logout, list, \
             move <collection> <from> <to>, delete <collection> <id>, quit",
            line.trim()
        )),
    }
}

fn print_page(page: &PageData) {
    println!("{} | {}", page.hero.title, page.hero.subtitle);
    println!("products:");
    for (index, product) in page.products.iter().enumerate() {
        println!(
            "  [{index}] #{} {} ({}) pos={}",
            product.id, product.title, product.price, product.position
        );
    }
    println!("testimonials:");
    for (index, testimonial) in page.testimonials.iter().enumerate() {
        println!(
            "  [{index}] #{} {} pos={}",
            testimonial.id, testimonial.name, testimonial.position
        );
    }
}

fn print_outcome(collection: Collection, outcome: ReorderOutcome) {
    match outcome {
        ReorderOutcome::Applied { writes } => {
            println!("{collection} reordered ({writes} position updates)")
        }
        ReorderOutcome::Failed { attempted, failed } => println!(
            "{collection} reorder partially failed: {failed} of {attempted} updates rejected; showing server order"
        ),
    }
}

async fn run_command(client: &StorefrontClient, command: Command) -> Result<(), ClientError> {
    match command {
        Command::Tap | Command::Quit => {}
        Command::Login(password) => {
            let session = client.login(&password).await?;
            println!("admin mode until {}", session.expires_at);
        }
        Command::Logout => {
            client.logout().await;
            println!("admin mode off");
        }
        Command::List => print_page(&client.fetch_page().await?),
        Command::Move {
            collection,
            from,
            to,
        } => {
            let page = client.fetch_page().await?;
            let refreshed = match collection {
                Collection::Products => {
                    let result = client.reorder_products(page.products, from, to).await?;
                    print_outcome(collection, result.report.outcome);
                    result.page
                }
                Collection::Testimonials => {
                    let result = client
                        .reorder_testimonials(page.testimonials, from, to)
                        .await?;
                    print_outcome(collection, result.report.outcome);
                    result.page
                }
            };
            match refreshed {
                Ok(page) => print_page(&page),
                Err(error) => println!("saved, but could not reload the page: {error}"),
            }
        }
        Command::Delete { collection, id } => {
            match collection {
                Collection::Products => client.delete_product(ProductId(id)).await?,
                Collection::Testimonials => client.delete_testimonial(TestimonialId(id)).await?,
            }
            println!("deleted {collection} #{id}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let client = StorefrontClient::new(&args.server_url)?;

    let unlocked = Arc::new(AtomicBool::new(false));
    let (unlock_tx, mut unlock_rx) = mpsc::unbounded_channel();
    let detector = {
        let unlocked = Arc::clone(&unlocked);
        GestureDetector::spawn(GestureConfig::default(), move || {
            unlocked.store(true, Ordering::SeqCst);
            let _ = unlock_tx.send(());
        })
    };

    match client.fetch_page().await {
        Ok(page) => print_page(&page),
        Err(error) => warn!(%error, "could not load page"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(()) = unlock_rx.recv() => {
                if client.is_admin().await {
                    println!("already in admin mode");
                } else {
                    println!("admin unlock: enter `login <password>`");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match parse_command(&line, unlocked.load(Ordering::SeqCst)) {
                    Ok(command) => command,
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                };
                match command {
                    Command::Quit => break,
                    Command::Tap => detector.on_tap(),
                    Command::Logout => {
                        unlocked.store(false, Ordering::SeqCst);
                        if let Err(error) = run_command(&client, Command::Logout).await {
                            println!("error: {error}");
                        }
                    }
                    command => {
                        if let Err(error) = run_command(&client, command).await {
                            println!("error: {error}");
                        }
                    }
                }
            }
        }
    }

    detector.dispose();
    Ok(())
}
