use admin_core::{ReorderCoordinator, ReorderOutcome};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::domain::{Collection, ProductDraft, TestimonialDraft};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/storefront.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints a value for APP__ADMIN_PASSWORD_HASH.
    HashPassword {
        password: String,
        #[arg(long, default_value_t = server_api::auth::HASH_COST)]
        cost: u32,
    },
    AddProduct {
        title: String,
        price: String,
        #[arg(long, default_value = "")]
        old_price: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        image: String,
        #[arg(long, default_value = "")]
        buy_url: String,
    },
    AddTestimonial {
        name: String,
        text: String,
        #[arg(long, default_value = "")]
        role: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    List,
    /// Moves the item at index `from` to index `to` in display order.
    Move {
        collection: Collection,
        from: usize,
        to: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::HashPassword { password, cost } = &cli.command {
        println!("{}", server_api::auth::hash_password(password, *cost)?);
        return Ok(());
    }

    let storage = Storage::new(&cli.database_url).await?;
    match cli.command {
        Command::HashPassword { .. } => {}
        Command::AddProduct {
            title,
            price,
            old_price,
            description,
            image,
            buy_url,
        } => {
            let product = storage
                .create_product(&ProductDraft {
                    title,
                    price,
                    old_price,
                    description,
                    image,
                    buy_url,
                })
                .await?;
            println!("created product_id={} position={}", product.id, product.position);
        }
        Command::AddTestimonial {
            name,
            text,
            role,
            image,
        } => {
            let testimonial = storage
                .create_testimonial(&TestimonialDraft {
                    name,
                    role,
                    text,
                    image,
                })
                .await?;
            println!(
                "created testimonial_id={} position={}",
                testimonial.id, testimonial.position
            );
        }
        Command::List => {
            for product in storage.list_products().await? {
                println!("product #{} pos={} {}", product.id, product.position, product.title);
            }
            for testimonial in storage.list_testimonials().await? {
                println!(
                    "testimonial #{} pos={} {}",
                    testimonial.id, testimonial.position, testimonial.name
                );
            }
        }
        Command::Move {
            collection,
            from,
            to,
        } => {
            let coordinator = ReorderCoordinator::new(storage.clone());
            let outcome = match collection {
                Collection::Products => {
                    let items = storage.list_products().await?;
                    coordinator.reorder(items, from, to).await?.outcome
                }
                Collection::Testimonials => {
                    let items = storage.list_testimonials().await?;
                    coordinator.reorder(items, from, to).await?.outcome
                }
            };
            match outcome {
                ReorderOutcome::Applied { writes } => {
                    println!("{collection}: moved {from} -> {to} ({writes} writes)")
                }
                ReorderOutcome::Failed { attempted, failed } => {
                    bail!("{collection}: {failed} of {attempted} position writes failed")
                }
            }
        }
    }

    Ok(())
}
