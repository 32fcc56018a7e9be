//! Instruction text for the style-analysis call and the prompt triple it
//! is expected to produce.

pub mod parser;

use serde::Deserialize;

pub use parser::parse_style_prompt;

const FALLBACK_STYLE_SUMMARY: &str = "High-detail illustration style with cinematic lighting.";
const FALLBACK_STYLE_SUFFIX: &str = "Render in a refined illustrative style with rich textures, cinematic lighting, and clean composition.";
const FALLBACK_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted, watermark";

/// Engineered prompt triple returned by the style analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StylePrompt {
    pub style_summary: String,
    pub final_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
}

impl StylePrompt {
    /// Fixed triple used whenever the analyzer output cannot be used.
    pub fn fallback(user_prompt: &str) -> Self {
        Self {
            style_summary: FALLBACK_STYLE_SUMMARY.to_string(),
            final_prompt: format!("{user_prompt}. {FALLBACK_STYLE_SUFFIX}"),
            negative_prompt: FALLBACK_NEGATIVE_PROMPT.to_string(),
        }
    }

    /// Trim the final and negative prompts in place.
    pub fn trimmed(self) -> Self {
        Self {
            style_summary: self.style_summary,
            final_prompt: self.final_prompt.trim().to_string(),
            negative_prompt: self.negative_prompt.trim().to_string(),
        }
    }
}

pub fn build_style_prompt_request(user_prompt: &str) -> String {
    format!(
        "Voce e um diretor de arte. Analise a referencia de estilo enviada e gere:\n\
1) \"style_summary\": resumo do estilo (paleta, luz, textura, pinceladas, contraste, atmosfera).\n\
2) \"final_prompt\": prompt completo (em ingles) combinando o estilo com o pedido do usuario.\n\
3) \"negative_prompt\": lista curta de elementos a evitar.\n\
\n\
Pedido do usuario: \"{user_prompt}\".\n\
\n\
Responda em JSON estrito com as chaves: style_summary, final_prompt, negative_prompt."
    )
}
