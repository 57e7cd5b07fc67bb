use anyhow::{Context, Result};

use crate::domain::LifecycleType;
use crate::workflow::stages::{stages_for, StageDefinition};

pub struct StagesCommand {
    pub lifecycle: Option<String>,
    pub json: bool,
}

impl StagesCommand {
    pub fn new(lifecycle: Option<String>) -> Self {
        Self {
            lifecycle,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn selected(&self) -> Result<Vec<LifecycleType>> {
        match &self.lifecycle {
            Some(name) => {
                let lifecycle = name
                    .parse::<LifecycleType>()
                    .with_context(|| format!("cannot print stages for '{name}'"))?;
                Ok(vec![lifecycle])
            }
            None => Ok(LifecycleType::ALL.to_vec()),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let selected = self.selected()?;

        if self.json {
            let registry: serde_json::Map<String, serde_json::Value> = selected
                .iter()
                .map(|lifecycle| -> Result<(String, serde_json::Value)> {
                    Ok((
                        lifecycle.as_str().to_string(),
                        serde_json::to_value(stages_for(*lifecycle))?,
                    ))
                })
                .collect::<Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&registry)?);
            return Ok(());
        }

        for lifecycle in selected {
            println!("📋 {lifecycle}");
            println!("────────────────────");
            for stage in stages_for(lifecycle) {
                println!("{}", format_stage(stage));
            }
            println!();
        }
        Ok(())
    }
}

fn format_stage(stage: &StageDefinition) -> String {
    format!(
        "  {:>2}. {:<18} {:<26} {}",
        stage.order,
        stage.name,
        stage.required_role.unwrap_or("(terminal)"),
        stage.description
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_lifecycle_is_rejected() {
        let command = StagesCommand::new(Some("RENAMING_ITEM".to_string()));
        assert!(command.selected().is_err());
    }

    #[test]
    fn test_no_lifecycle_selects_all() {
        assert_eq!(StagesCommand::new(None).selected().unwrap().len(), 3);
    }
}
