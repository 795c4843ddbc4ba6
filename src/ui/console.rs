use colored::{ColoredString, Colorize};

use menulens::analysis::{AnalysisResponse, ConnectionStatus, Suitability};
use menulens::config::{BackendMode, ProviderKind, Settings};
use menulens::core::MetricsSummary;
use menulens::llm::CacheStats;

pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }

    pub fn banner(&self) {
        println!(
            "{} {}",
            "MENULENS".bright_green().bold(),
            format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
        );
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", "[INFO]".blue(), message);
    }

    pub fn error(&self, message: &str) {
        println!("{} {}", "[ERROR]".red(), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "[OK]".green(), message);
    }

    fn suitability(&self, suitability: Suitability) -> ColoredString {
        let label = suitability.to_string();
        match suitability {
            Suitability::Safe => label.green().bold(),
            Suitability::NeedsClarification => label.yellow().bold(),
            Suitability::Avoid => label.red().bold(),
        }
    }

    pub fn analysis(&self, response: &AnalysisResponse) {
        if !response.success {
            self.error(response.message.as_deref().unwrap_or("Analysis failed"));
            return;
        }

        println!("\n{}", "MENU ANALYSIS".bold().underline());
        println!("{}", "─".repeat(50));

        for result in &response.results {
            println!(
                "\n  {} {} {}",
                self.suitability(result.suitability),
                result.item_name.cyan().bold(),
                format!("({:.0}%)", result.confidence * 100.0).dimmed()
            );
            if !result.explanation.is_empty() {
                println!("    {}", result.explanation);
            }
            for concern in result.concerns.iter().flatten() {
                println!("    {} {}", "!".yellow(), concern);
            }
            for question in result.questions.iter().flatten() {
                println!("    {} {}", "?".cyan(), question);
            }
        }

        if let Some(message) = &response.message {
            println!("\n  {}", message.dimmed());
        }

        let source = if response.from_cache {
            "cache".to_string()
        } else {
            response.provider.clone().unwrap_or_else(|| "unknown".to_string())
        };
        println!(
            "\n  {} {:.0}%  {} {}  {} {}ms\n",
            "Confidence:".yellow(),
            response.confidence * 100.0,
            "Source:".yellow(),
            source,
            "Time:".yellow(),
            response.processing_time_ms
        );
    }

    pub fn connection(&self, status: &ConnectionStatus) {
        let latency = format!("({}ms)", status.latency_ms).dimmed();
        if status.success {
            println!("{} {} {}", "[OK]".green(), status.message, latency);
        } else {
            println!("{} {} {}", "[ERROR]".red(), status.message, latency);
        }
    }

    pub fn list_providers(&self, settings: &Settings, active: ProviderKind) {
        println!("\n{}", "AI PROVIDERS".bold().underline());
        println!("{}", "─".repeat(50));
        println!("  {} {}", "Backend:".yellow(), settings.backend_mode.to_string().green());

        for kind in ProviderKind::all() {
            let marker = if kind == active { "→ " } else { "  " };
            let status = if settings.is_configured(kind) {
                "configured".green()
            } else {
                "not configured".red()
            };
            println!("  {}{} {}", marker.green(), kind.as_str().cyan().bold(), status);
        }
        println!();
    }

    pub fn cache_stats(&self, stats: &CacheStats) {
        println!("\n{}", "ANALYSIS CACHE".bold().underline());
        println!("{}", "─".repeat(50));
        println!("  {} {}", "Entries:".yellow(), stats.total_entries);
        println!("  {} {}", "Expired:".yellow(), stats.expired_entries);
        println!();
    }

    pub fn metrics(&self, summary: &MetricsSummary) {
        print!("{}", summary.to_string().dimmed());
    }

    pub fn show_config(&self, settings: &Settings) {
        println!("\n{}", "CONFIGURATION".bold().underline());
        println!("{}", "─".repeat(50));

        println!("  {} {}", "Backend:".yellow(), settings.backend_mode.to_string().green());
        println!("  {} {}", "Provider:".yellow(), settings.provider.as_str().green());

        println!("\n  {}", "Gemini:".yellow());
        println!("    Endpoint: {}", settings.gemini.endpoint.dimmed());
        println!("    Model: {}", settings.gemini.model.dimmed());
        println!("    API key: {}", self.presence(settings.gemini_api_key().is_some()));

        println!("\n  {}", "Vertex AI:".yellow());
        println!(
            "    Project: {}",
            settings.vertex.project_id.as_deref().unwrap_or("-").dimmed()
        );
        println!("    Location: {}", settings.vertex.location.dimmed());
        println!("    Model: {}", settings.vertex.model.dimmed());
        println!(
            "    Access token: {}",
            self.presence(settings.vertex_access_token().is_some())
        );

        if settings.backend_mode == BackendMode::Proxy {
            println!("\n  {}", "Proxy:".yellow());
            println!(
                "    Base URL: {}",
                settings.proxy.base_url.as_deref().unwrap_or("-").dimmed()
            );
            println!(
                "    Access token: {}",
                self.presence(settings.proxy.access_token.is_some())
            );
        }

        println!("\n  {}", "Requests:".yellow());
        println!("    Timeout: {}ms", settings.request.timeout_ms);
        println!("    Max attempts: {}", settings.request.max_retries);
        println!("    Cache TTL: {} days", settings.cache.ttl_days);

        if let Ok(path) = Settings::config_path() {
            println!(
                "\n  {} {}",
                "Config file:".yellow(),
                path.display().to_string().dimmed()
            );
        }
        println!();
    }

    fn presence(&self, present: bool) -> ColoredString {
        if present {
            "set".green()
        } else {
            "missing".red()
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
