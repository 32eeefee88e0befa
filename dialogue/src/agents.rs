//! Role agents: the client and counselor generators.
//!
//! Each agent owns its role instructions and temperature and turns the
//! history into a generation request from its own perspective. Neither
//! retries: transport errors go back to the caller.

use std::sync::Arc;

use crate::history::{project, DialogueHistory, Mode, Role, SessionKind};
use crate::prompts::{render, PromptTemplates};
use crate::transport::{GenerationRequest, TextGenerator, TransportError};

/// Synthetic client driven by a profile.
pub struct ClientAgent {
    generator: Arc<dyn TextGenerator>,
    system_prompt: String,
    temperature: f32,
}

impl ClientAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        templates: &PromptTemplates,
        profile: &str,
        temperature: f32,
    ) -> Self {
        Self {
            generator,
            system_prompt: render(&templates.client_system, &[("profile", profile)]),
            temperature,
        }
    }

    pub fn request(&self, history: &DialogueHistory, mode: Mode) -> GenerationRequest {
        GenerationRequest {
            system_prompt: self.system_prompt.clone(),
            messages: project(history.turns(), Role::Client, mode),
            temperature: self.temperature,
        }
    }

    /// Single-shot client turn.
    pub async fn respond(
        &self,
        history: &DialogueHistory,
        mode: Mode,
    ) -> Result<String, TransportError> {
        let text = self.generator.generate(&self.request(history, mode)).await?;
        Ok(text.trim().to_string())
    }
}

/// Counselor whose drafts go through the revision loop.
pub struct CounselorAgent {
    generator: Arc<dyn TextGenerator>,
    templates: Arc<PromptTemplates>,
    session_kind: SessionKind,
    temperature: f32,
}

impl CounselorAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        templates: Arc<PromptTemplates>,
        session_kind: SessionKind,
        temperature: f32,
    ) -> Self {
        Self {
            generator,
            templates,
            session_kind,
            temperature,
        }
    }

    /// Role instructions, with revision guidance appended when present.
    pub fn system_prompt(&self, guidance: Option<&str>) -> String {
        let base = match self.session_kind {
            SessionKind::First => &self.templates.counselor_system,
            SessionKind::FollowUp => &self.templates.counselor_follow_up_system,
        };
        match guidance {
            Some(guidance) => {
                let block = render(&self.templates.guidance_block, &[("guidance", guidance)]);
                format!("{base}{block}")
            }
            None => base.clone(),
        }
    }

    pub fn request(
        &self,
        history: &DialogueHistory,
        mode: Mode,
        guidance: Option<&str>,
    ) -> GenerationRequest {
        GenerationRequest {
            system_prompt: self.system_prompt(guidance),
            messages: project(history.turns(), Role::Counselor, mode),
            temperature: self.temperature,
        }
    }

    /// One counselor draft, optionally steered by revision guidance.
    pub async fn draft(
        &self,
        history: &DialogueHistory,
        mode: Mode,
        guidance: Option<&str>,
    ) -> Result<String, TransportError> {
        let request = self.request(history, mode, guidance);
        let text = self.generator.generate(&request).await?;
        Ok(text.trim().to_string())
    }
}
