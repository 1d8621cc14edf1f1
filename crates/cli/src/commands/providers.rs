//! `switchboard providers`: configured providers and whether each one can be
//! used right now.

use switchboard_config::AppConfig;
use switchboard_providers::ProviderRouter;

use crate::runtime::Options;

pub fn run(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let config = options
        .load_config()
        .map_err(|e| format!("Failed to load config: {e}"))?;
    let router = switchboard_providers::build_from_config(&config);

    println!("Configured providers (default: {})", config.default_provider);
    println!();
    for line in provider_lines(&config, &router) {
        println!("  {line}");
    }

    if !config.aliases.is_empty() {
        println!();
        println!("Aliases:");
        for (alias, target) in &config.aliases {
            println!("  {alias} -> {target}");
        }
    }
    Ok(())
}

fn provider_lines(config: &AppConfig, router: &ProviderRouter) -> Vec<String> {
    config
        .providers
        .iter()
        .map(|(id, provider)| {
            let status = match router.build_descriptor(id, None, "", &[]).invalid_reason() {
                None => "ready".to_string(),
                Some(reason) => format!("unusable: {reason}"),
            };
            format!(
                "{id:<12} {:<14} model={:<24} budget={:<6} fallback={:<12} {status}",
                provider.kind.as_str(),
                provider.model.as_deref().unwrap_or("-"),
                config.context_budget(id),
                provider.fallback.as_deref().unwrap_or("-"),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_providers_are_ready() {
        let config = AppConfig::default();
        let router = switchboard_providers::build_from_config(&config);
        let lines = provider_lines(&config, &router);

        assert_eq!(lines.len(), config.providers.len());
        let ollama = lines.iter().find(|l| l.starts_with("ollama ")).unwrap();
        assert!(ollama.ends_with("ready"), "{ollama}");
        assert!(ollama.contains("fallback=ollama_pc"));
    }
}
