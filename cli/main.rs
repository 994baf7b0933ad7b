use clap::{Parser, Subcommand};
use imgreg::prelude::*;
use std::error::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imgreg")]
#[command(about = "Administrative CLI for the image registry", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the registry database.
    Migrate,

    /// List every live image.
    Images {
        #[arg(short, long, help = "Tag filter, e.g. \"ubuntu AND NOT beta\"")]
        tags: Option<String>,
    },

    /// Attach tags to an image.
    Tag {
        #[arg(help = "Image id")]
        id: String,

        #[arg(required = true, help = "Tags to add")]
        tags: Vec<String>,
    },

    /// Share an image with another tenant.
    Share {
        #[arg(help = "Image id")]
        id: String,

        #[arg(help = "Tenant receiving access")]
        tenant: String,

        #[arg(long, help = "Allow the tenant to share the image further")]
        can_share: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let registry = cli.config.open_registry().await?;
    let ctx = RequestContext::admin();

    match cli.command {
        Commands::Migrate => {
            println!("Registry database is up to date: {}", cli.config.database_url);
        }
        Commands::Images { tags } => {
            let mut query = ImageQuery::live();
            if let Some(tags) = tags {
                query = query.with_expr(parse_query(&tags)?);
            }

            for image in list_images(registry.as_ref(), &ctx, query).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    image.id,
                    image.status.as_str(),
                    image.visibility.as_str(),
                    image.name.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Tag { id, tags } => {
            for tag in &tags {
                add_tag(registry.as_ref(), &ctx, &id, tag).await?;
            }
            println!("Tagged {id}: {}", tags.join(" "));
        }
        Commands::Share {
            id,
            tenant,
            can_share,
        } => {
            let grant = AccessGrant {
                member: tenant,
                can_share,
            };
            let record = create_access(registry.as_ref(), &ctx, &id, grant).await?;
            println!(
                "Shared {} with {} (can_share: {})",
                record.image_id, record.member, record.can_share
            );
        }
    }

    Ok(())
}
