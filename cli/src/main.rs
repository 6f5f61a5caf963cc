use clap::{Parser, Subcommand};
use learnpath::model::entity::{
    Module, ModuleCreate, Pathway, PathwayCreate, RESOURCE_TYPES, Resource, ResourceCreate,
    UserEntity, UserEntityCreateUpdate,
};
use learnpath::model::{CrudRepository, DbConnection, ModelManager};
use learnpath::web::{AuthenticatedUser, UserRole};

#[derive(Parser, Debug)]
#[command(about = "CLI tool for seeding the learnpath database", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage pathways
    Pathway {
        #[command(subcommand)]
        action: PathwayCommands,
    },

    /// Manage modules
    Module {
        #[command(subcommand)]
        action: ModuleCommands,
    },

    /// Manage resources
    Resource {
        #[command(subcommand)]
        action: ResourceCommands,
    },

    /// Recompute `total_modules` of every pathway
    RecomputeTotals,
}

/// User management
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        password: String,
        /// user, instructor or admin
        #[arg(long, default_value = "user")]
        role: String,
    },
}

/// Pathway management
#[derive(Subcommand, Debug)]
pub enum PathwayCommands {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        short_title: String,
        #[arg(long)]
        instructor: String,
        #[arg(long, default_value = "#4f46e5")]
        color: String,
    },
}

/// Module management
#[derive(Subcommand, Debug)]
pub enum ModuleCommands {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        pathway_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        order_index: i32,
        #[arg(long)]
        duration_minutes: Option<i32>,
    },
}

/// Resource management
#[derive(Subcommand, Debug)]
pub enum ResourceCommands {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        module_id: String,
        /// video, article, exercise, project or quiz
        #[arg(long = "type")]
        resource_type: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        order_index: i32,
        #[arg(long)]
        duration_minutes: Option<i32>,
        #[arg(long, default_value_t = false)]
        requires_upload: bool,
        /// MIME patterns, `image/*` allowed. Repeat or separate with commas
        #[arg(long, value_delimiter = ',')]
        accept: Vec<String>,
        #[arg(long, default_value_t = 50)]
        max_file_size_mb: i32,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        allow_resubmission: bool,
        #[arg(long)]
        url: Option<String>,
    },
}

fn parse_role(role: &str) -> Option<UserRole> {
    match role {
        "user" | "instructor" | "admin" => Some(UserRole::from(role)),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> learnpath::error::AppResult<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let config = learnpath::Config::get_or_init(cfg!(debug_assertions)).await;
    let db_con = DbConnection::connect(config.app().database_uri())?;
    let mm = ModelManager::new(db_con);
    let actor = AuthenticatedUser::admin();

    match args.command {
        Commands::User { action } => match action {
            UserCommands::Add {
                email,
                full_name,
                password,
                role,
            } => {
                let Some(role) = parse_role(&role) else {
                    eprintln!("unknown role {role:?}, expected user, instructor or admin");
                    std::process::exit(2);
                };
                let hash = learnpath::auth::hash_password(&password)?;
                let user = UserEntity::create(
                    &mm,
                    &actor,
                    UserEntityCreateUpdate::with_password(&email, &full_name, hash).role(role),
                )
                .await?;
                println!("User created: {:?}", user);
            }
        },

        Commands::Pathway { action } => match action {
            PathwayCommands::Add {
                id,
                slug,
                title,
                short_title,
                instructor,
                color,
            } => {
                let pathway = Pathway::create(
                    &mm,
                    &actor,
                    PathwayCreate {
                        id,
                        slug,
                        title,
                        short_title,
                        instructor,
                        color,
                    },
                )
                .await?;
                println!("Pathway created: {:?}", pathway);
            }
        },

        Commands::Module { action } => match action {
            ModuleCommands::Add {
                id,
                pathway_id,
                title,
                description,
                order_index,
                duration_minutes,
            } => {
                let module = Module::create(
                    &mm,
                    &actor,
                    ModuleCreate {
                        id,
                        pathway_id: pathway_id.clone(),
                        title,
                        description,
                        order_index,
                        duration_minutes,
                    },
                )
                .await?;
                let total = Pathway::refresh_total_modules(&mm, &pathway_id).await?;
                println!("Module created: {:?} ({} modules in pathway)", module, total);
            }
        },

        Commands::Resource { action } => match action {
            ResourceCommands::Add {
                id,
                module_id,
                resource_type,
                title,
                description,
                order_index,
                duration_minutes,
                requires_upload,
                accept,
                max_file_size_mb,
                allow_resubmission,
                url,
            } => {
                if !RESOURCE_TYPES.contains(&resource_type.as_str()) {
                    eprintln!(
                        "unknown resource type {resource_type:?}, expected one of {}",
                        RESOURCE_TYPES.join(", ")
                    );
                    std::process::exit(2);
                }
                let cap = config.storage().max_upload_mb();
                if usize::try_from(max_file_size_mb).map_or(true, |mb| mb > cap) {
                    eprintln!("max_file_size_mb must be between 0 and storage.max_upload_mb ({cap})");
                    std::process::exit(2);
                }
                let Some(module) = Module::find_by_id(&mm, &actor, module_id.clone()).await? else {
                    eprintln!("module {module_id:?} does not exist");
                    std::process::exit(2);
                };

                let resource = Resource::create(
                    &mm,
                    &actor,
                    ResourceCreate {
                        id,
                        pathway_id: module.pathway_id().to_string(),
                        module_id,
                        resource_type,
                        title,
                        description,
                        order_index,
                        duration_minutes,
                        requires_upload,
                        accepted_file_types: (!accept.is_empty()).then_some(accept),
                        max_file_size_mb,
                        allow_resubmission,
                        url,
                    },
                )
                .await?;
                println!("Resource created: {:?}", resource);
            }
        },

        Commands::RecomputeTotals => {
            let updated = Pathway::refresh_all_totals(&mm).await?;
            println!("Recomputed totals for {} pathways", updated);
        }
    }

    Ok(())
}
