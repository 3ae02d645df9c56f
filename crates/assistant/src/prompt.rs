//! System prompts for the two assistant modes.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::AssistantMode;

const INTAKE_PROMPT: &str = "\
You are the intake assistant of Afscheid, a Dutch funeral services marketplace. \
You help bereaved families prepare a funeral request: the type of service \
(burial, cremation or memorial), preferred dates, expected number of attendees, \
wishes for the ceremony and the venue. Ask one question at a time, keep a calm \
and respectful tone and answer in the language the family writes in (Dutch by \
default). Remind families that the funeral must take place no later than the \
sixth working day after the death unless the municipality grants an exemption. \
Never give legal or medical advice beyond these general facts and never invent \
prices; prices are shown when a director and venue are chosen.";

const COMPLIANCE_PROMPT: &str = "\
You are the compliance assistant of Afscheid for funeral directors in the \
Netherlands. Answer questions about the Wet op de lijkbezorging: registering the \
death with the municipality (aangifte van overlijden), the burial or cremation \
permit (verlof tot begraven of cremeren) and the rule that burial or cremation \
happens no later than the sixth working day after death, weekends excluded. \
When the deadline cannot be met, explain that the director must request \
permission (uitstel) from the mayor of the municipality. Be precise and brief, \
and say so when a question needs a lawyer or the municipality.";

/// Deadline facts for one booking, added to the compliance prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceContext {
    pub death_registration_date: String,
    pub legal_deadline: String,
    pub days_remaining: i64,
    pub status: String,
    pub emergency_reason: Option<String>,
}

pub fn system_prompt(mode: AssistantMode, compliance: Option<&ComplianceContext>) -> String {
    match mode {
        AssistantMode::Intake => INTAKE_PROMPT.to_string(),
        AssistantMode::Compliance => {
            let mut prompt = COMPLIANCE_PROMPT.to_string();
            if let Some(context) = compliance {
                let _ = write!(
                    prompt,
                    "\n\nCurrent case: death registered on {}, legal deadline {}, \
                     {} day(s) remaining, status {}.",
                    context.death_registration_date,
                    context.legal_deadline,
                    context.days_remaining,
                    context.status
                );
                if let Some(reason) = &context.emergency_reason {
                    let _ = write!(prompt, " Emergency reported: {reason}.");
                }
            }
            prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compliance_prompt_includes_case_details() {
        let context = ComplianceContext {
            death_registration_date: "2025-03-07".into(),
            legal_deadline: "2025-03-17".into(),
            days_remaining: 1,
            status: "urgent".into(),
            emergency_reason: None,
        };

        let prompt = system_prompt(AssistantMode::Compliance, Some(&context));
        assert!(prompt.contains("Wet op de lijkbezorging"));
        assert!(prompt.contains("legal deadline 2025-03-17"));
        assert!(prompt.contains("1 day(s) remaining"));
        assert!(!prompt.contains("Emergency reported"));
    }

    #[test]
    fn intake_prompt_ignores_compliance_context() {
        let context = ComplianceContext {
            death_registration_date: "2025-03-07".into(),
            legal_deadline: "2025-03-17".into(),
            days_remaining: -2,
            status: "overdue".into(),
            emergency_reason: Some("autopsy".into()),
        };
        let prompt = system_prompt(AssistantMode::Intake, Some(&context));
        assert!(!prompt.contains("2025-03-17"));
        assert!(prompt.contains("intake assistant"));
    }
}
