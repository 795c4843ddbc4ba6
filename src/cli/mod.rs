use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "menulens")]
#[command(author = "MenuLens Team")]
#[command(version)]
#[command(about = "Check restaurant menus against your dietary needs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the AI provider for this run (gemini, vertex)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Keep cached analyses in memory for this run only
    #[arg(long, global = true)]
    pub no_cache_persist: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze menu items, menu text or menu photos
    Analyze {
        /// Dietary regime (vegan, vegetarian, gluten-free, ...)
        #[arg(short, long)]
        diet: String,

        /// Extra restrictions in free text
        #[arg(short, long)]
        restrictions: Option<String>,

        /// JSON file with an array of menu items
        #[arg(short, long)]
        items: Option<String>,

        /// Menu item name (repeatable)
        #[arg(long = "item")]
        item_names: Vec<String>,

        /// Raw menu text
        #[arg(long)]
        text: Option<String>,

        /// Menu photo (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// Restaurant or cuisine context
        #[arg(short, long)]
        context: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Test the connection to the active provider
    Test,

    /// List providers and whether they are configured
    Providers,

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show entry counts
    Stats,

    /// Delete every cached analysis
    Clear,

    /// Delete expired entries only
    Purge,
}
