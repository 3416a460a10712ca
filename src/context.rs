//! Process-wide state, owned in one place and passed to whoever needs it.

use crate::{
    agent::{
        AgentClient,
        AgentOptions,
        CardAgent,
        ClaudeCliTransport,
    },
    anki::{
        migrate::Migrator,
        AnkiClientHandle,
    },
    config::{
        ConfigStore,
        Settings,
    },
    core::{
        models::validate_drafts,
        CardError,
        CardGenerator,
        CardType,
        DraftCard,
        GeneratedCard,
    },
    export::{
        generate_csv,
        Priority,
    },
};

pub type CliAgent = AgentClient<ClaudeCliTransport>;

pub struct AppContext<A = CliAgent> {
    pub settings: Settings,
    pub config: ConfigStore,
    pub anki: AnkiClientHandle,
    pub generator: CardGenerator<A>,
}

impl AppContext<CliAgent> {
    pub fn from_settings(settings: Settings) -> Self {
        let options = AgentOptions {
            model: settings.model.clone(),
            timeout: settings.agent_timeout,
            ..Default::default()
        };
        let agent = AgentClient::new(ClaudeCliTransport::new(&settings.agent_cli), options);
        Self::with_agent(settings, agent)
    }
}

impl<A: CardAgent> AppContext<A> {
    pub fn with_agent(settings: Settings, agent: A) -> Self {
        Self {
            config: ConfigStore::from_settings(&settings),
            anki: AnkiClientHandle::from_settings(&settings),
            generator: CardGenerator::new(agent),
            settings,
        }
    }

    pub async fn generate(
        &self,
        drafts: &[DraftCard],
        max_repair_attempts: u32,
    ) -> Result<Vec<GeneratedCard>, CardError> {
        validate_drafts(drafts)?;
        let config = self.config.load().await?;
        let cards = self
            .generator
            .generate(drafts, &config.fields, &config.tags, max_repair_attempts)
            .await?;
        Ok(cards)
    }

    pub async fn regenerate(
        &self,
        draft: &DraftCard,
        target_type: CardType,
        max_repair_attempts: u32,
    ) -> Result<GeneratedCard, CardError> {
        draft.validate()?;
        let config = self.config.load().await?;
        let card = self
            .generator
            .regenerate_card(draft, target_type, &config.fields, &config.tags, max_repair_attempts)
            .await?;
        Ok(card)
    }

    /// CSV for `cards`. `source` may be a source label or tag; without one the
    /// configured default source applies.
    pub async fn export_csv(
        &self,
        cards: &[GeneratedCard],
        source: Option<&str>,
        priority: Option<Priority>,
    ) -> Result<String, CardError> {
        for card in cards {
            card.validate()?;
        }
        let config = self.config.load().await?;
        let source = source
            .map(|s| config.source_tag(s).unwrap_or(s))
            .or(config.default_source.as_deref());
        generate_csv(cards, &config, source, priority)
    }

    pub async fn migrator(&self) -> Migrator<'_, A> {
        Migrator::new(self.anki.get().await, &self.generator, &self.settings.migration)
    }
}
