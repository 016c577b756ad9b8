//! Role-play scenario catalogue.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Row returned by scenario queries.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScenarioRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub target_language: String,
    pub ai_role: String,
    pub system_prompt: String,
    pub opening_line: String,
}

impl ScenarioRow {
    /// Full system prompt sent to the model for conversations in this scenario.
    pub fn compose_system_prompt(&self) -> String {
        format!(
            "You are {role}. You are helping a learner practise {language} through role-play. \
             Stay in character and reply only in {language}.\n\n{instructions}",
            role = self.ai_role,
            language = self.target_language,
            instructions = self.system_prompt.trim(),
        )
    }
}

/// List all scenarios, ordered by title.
pub async fn list_scenarios(pool: &PgPool) -> Result<Vec<ScenarioRow>, sqlx::Error> {
    sqlx::query_as::<_, ScenarioRow>(
        r#"
        SELECT id, slug, title, description, target_language, ai_role, system_prompt, opening_line
        FROM scenarios
        ORDER BY title ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Get a scenario by slug.
pub async fn get_scenario_by_slug(pool: &PgPool, slug: &str) -> Result<ScenarioRow, sqlx::Error> {
    sqlx::query_as::<_, ScenarioRow>(
        r#"
        SELECT id, slug, title, description, target_language, ai_role, system_prompt, opening_line
        FROM scenarios
        WHERE slug = $1
        "#,
    )
    .bind(slug)
    .fetch_one(pool)
    .await
}

/// Get a scenario by ID.
pub async fn get_scenario(pool: &PgPool, scenario_id: &Uuid) -> Result<ScenarioRow, sqlx::Error> {
    sqlx::query_as::<_, ScenarioRow>(
        r#"
        SELECT id, slug, title, description, target_language, ai_role, system_prompt, opening_line
        FROM scenarios
        WHERE id = $1
        "#,
    )
    .bind(scenario_id)
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_role_and_language() {
        let scenario = ScenarioRow {
            id: Uuid::nil(),
            slug: "cafe-order".into(),
            title: "Ordering at a café".into(),
            description: String::new(),
            target_language: "French".into(),
            ai_role: "a waiter in Paris".into(),
            system_prompt: "  Keep it short.  ".into(),
            opening_line: "Bonjour !".into(),
        };
        let prompt = scenario.compose_system_prompt();
        assert!(prompt.starts_with("You are a waiter in Paris."));
        assert!(prompt.contains("reply only in French"));
        assert!(prompt.ends_with("Keep it short."));
    }
}
