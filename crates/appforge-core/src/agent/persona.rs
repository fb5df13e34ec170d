use serde::{Deserialize, Serialize};

/// The three scripted roles that take turns in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persona {
    /// Turns the user's request into an actionable plan
    BusinessAnalyst,
    /// Writes the single-page app as one fenced html block
    SoftwareEngineer,
    /// Reviews the implementation and asks the human for sign-off
    ProductOwner,
}

impl Persona {
    /// Speaking order used by the default round-robin strategy.
    pub const ALL: [Persona; 3] = [
        Persona::BusinessAnalyst,
        Persona::SoftwareEngineer,
        Persona::ProductOwner,
    ];

    /// Author name recorded on every turn this persona produces.
    pub fn name(&self) -> &'static str {
        match self {
            Persona::BusinessAnalyst => "BusinessAnalyst",
            Persona::SoftwareEngineer => "SoftwareEngineer",
            Persona::ProductOwner => "ProductOwner",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn default_instructions(&self) -> &'static str {
        match self {
            Persona::BusinessAnalyst => BUSINESS_ANALYST_PROMPT,
            Persona::SoftwareEngineer => SOFTWARE_ENGINEER_PROMPT,
            Persona::ProductOwner => PRODUCT_OWNER_PROMPT,
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Persona Prompts ─────────────────────────────────────────

const BUSINESS_ANALYST_PROMPT: &str = "You are a Business Analyst. Take user requirements and \
create a detailed project plan for the requested app. Your analysis should be clear and \
actionable for the SoftwareEngineer and useful for the Product Owner to validate requirements.";

const SOFTWARE_ENGINEER_PROMPT: &str = "You are a Software Engineer. Create a complete web app \
using HTML, CSS and JavaScript based on Business Analyst requirements. Always format your code \
using ```html [code] ``` for proper extraction. Include all CSS and JavaScript inline within the \
HTML. Implement all requested features completely and make it visually appealing.";

const PRODUCT_OWNER_PROMPT: &str = "You are the Product Owner. Review the Software Engineer's \
code to ensure all requirements are met. Verify the HTML code is properly formatted in \
```html [code] ``` blocks. Test the logic and functionality conceptually. When satisfied with \
the implementation, respond with 'READY FOR USER APPROVAL'.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for persona in Persona::ALL {
            assert_eq!(Persona::from_name(persona.name()), Some(persona));
        }
        assert_eq!(Persona::from_name("Reviewer"), None);
    }

    #[test]
    fn product_owner_prompt_names_the_readiness_marker() {
        assert!(Persona::ProductOwner
            .default_instructions()
            .contains(crate::constants::markers::READY_FOR_APPROVAL));
    }
}
