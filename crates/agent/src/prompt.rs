//! System prompt assembly and `/skill` tags.
//!
//! The prompt is the base instructions, an optional context block about the
//! user, the section for the current mode, then whatever skills apply:
//! knowledge skills always, tool skills as a list the model can fetch from,
//! and on-demand skills only when the user named them.

use regex_lite::Regex;
use std::sync::LazyLock;
use toolgate_config::{PromptContext, SkillConfig, SkillKind};
use toolgate_core::AgentMode;

static SKILL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/([a-zA-Z][a-zA-Z0-9_-]*)").expect("skill tag pattern is valid")
});

const BASE_INSTRUCTIONS: &str = "You are Toolgate, an assistant that works inside the user's messaging account.

CHOOSING TOOLS:
- \"this chat\" or \"the current chat\": call getCurrentChat first
- Finding chats: listChats, searchMessages, getChatInfo
- Reading a conversation: getRecentMessages
- Pending work and follow-ups: listPendingChats, getChatTasks
- CRM records linked to a chat: getChatRelationship, then useExtraTool(\"crm\")

EXTRA TOOLS (call useExtraTool with the group name before using them):
- \"crm\": contacts, deals and notes in connected CRMs
- \"notion\": Notion pages and blocks
- \"reminders\": reminders tied to chats
- \"bulk\": processing many pending tasks at once
- \"skills\": reading and managing the user's skills

SKILLS:
The user can teach you behaviours through skills.
1. Knowledge skills (KNOWLEDGE section) apply to every response.
2. Tool skills (AVAILABLE SKILLS section) are listed by context. Fetch one with getSkillData when its context matches.
3. On-demand skills (INVOKED SKILLS section) appear only when the user typed /skill-name. Apply them to this request.
When contexts overlap, invoked skills win over knowledge, and knowledge wins over tool skills.";

const ASK_SECTION: &str = "

MODE: READ-ONLY (Ask)
You can look things up but you cannot change anything.
Do not send messages, move chats, or edit records.
Answer concisely from what the read tools return.";

const PLAN_SECTION: &str = "

MODE: PLANNING (Plan)
You can look things up and propose a plan, but you do not execute writes.
1. Gather context with the read tools.
2. Lay out the steps you would take and what each one changes.
3. Wait for the user to confirm before anything is done.";

const AGENT_SECTION: &str = "

MODE: FULL ACCESS (Agent)
You can read and act on the user's behalf.
Say what you are about to do before deleting or archiving anything.
Deletions are held for the user's confirmation before they run.
Summarize what you changed when you finish.";

/// Split `/skill-name` tags off a user message.
///
/// Returns the lower-cased tag names in order and the message with the tags
/// removed and whitespace collapsed.
pub fn parse_skill_tags(message: &str) -> (Vec<String>, String) {
    let names = SKILL_TAG
        .captures_iter(message)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect();
    let cleaned = SKILL_TAG
        .replace_all(message, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (names, cleaned)
}

fn context_block(context: &PromptContext) -> String {
    let mut lines = Vec::new();

    let name = context.user_name.as_deref().filter(|n| !n.is_empty());
    let username = context.username.as_deref().filter(|n| !n.is_empty());
    if name.is_some() || username.is_some() {
        let display = name.or(username).unwrap_or("User");
        match username {
            Some(handle) => lines.push(format!("User: {display} (@{handle})")),
            None => lines.push(format!("User: {display}")),
        }
    }
    if let Some(org) = context.organization.as_deref().filter(|o| !o.is_empty()) {
        lines.push(format!("Organization: {org}"));
    }

    if lines.is_empty() {
        String::new()
    } else {
        format!("\nCONTEXT:\n{}\n", lines.join("\n"))
    }
}

fn knowledge_section(skills: &[&SkillConfig]) -> String {
    let body = skills
        .iter()
        .map(|s| format!("### {}\nContext: {}\n\n{}", s.name.to_uppercase(), s.context, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "\n\n=== KNOWLEDGE (ALWAYS APPLY) ===\nThe following instructions should always guide your responses:\n\n{body}"
    )
}

fn tool_skills_section(skills: &[&SkillConfig]) -> String {
    let list = skills
        .iter()
        .map(|s| format!("- \"{}\" (/{})", s.context, s.name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "\n\n=== AVAILABLE SKILLS (RETRIEVE WHEN RELEVANT) ===\n{list}\n\nIf a skill above applies, or says it always applies, call getSkillData(\"context\") before responding."
    )
}

fn invoked_section(skills: &[&SkillConfig]) -> String {
    let body = skills
        .iter()
        .map(|s| {
            format!(
                "### /{} (INVOKED BY USER)\nContext: {}\n\n{}",
                s.name.to_uppercase(),
                s.context,
                s.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "\n\n=== INVOKED SKILLS (APPLY FOR THIS REQUEST) ===\nThe user explicitly invoked the following skills. Apply them to this request:\n\n{body}"
    )
}

/// Enabled skills of one kind.
pub fn skills_of(skills: &[SkillConfig], kind: SkillKind) -> Vec<&SkillConfig> {
    skills.iter().filter(|s| s.enabled && s.kind == kind).collect()
}

/// Enabled on-demand skills named by `tags`, in tag order.
pub fn invoked_skills<'a>(skills: &'a [SkillConfig], tags: &[String]) -> Vec<&'a SkillConfig> {
    tags.iter()
        .filter_map(|tag| {
            skills.iter().find(|s| {
                s.enabled && s.kind == SkillKind::OnDemand && s.name.eq_ignore_ascii_case(tag)
            })
        })
        .collect()
}

pub fn build_system_prompt(
    mode: AgentMode,
    context: &PromptContext,
    skills: &[SkillConfig],
    invoked: &[&SkillConfig],
) -> String {
    let mut prompt = String::from(BASE_INSTRUCTIONS);
    prompt.push_str(&context_block(context));
    prompt.push_str(match mode {
        AgentMode::Ask => ASK_SECTION,
        AgentMode::Plan => PLAN_SECTION,
        AgentMode::Agent => AGENT_SECTION,
    });

    let knowledge = skills_of(skills, SkillKind::Knowledge);
    if !knowledge.is_empty() {
        prompt.push_str(&knowledge_section(&knowledge));
    }
    let tool_skills = skills_of(skills, SkillKind::Tool);
    if !tool_skills.is_empty() {
        prompt.push_str(&tool_skills_section(&tool_skills));
    }
    if !invoked.is_empty() {
        prompt.push_str(&invoked_section(invoked));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(name: &str, kind: SkillKind) -> SkillConfig {
        SkillConfig {
            name: name.into(),
            kind,
            context: format!("{name} context"),
            content: format!("{name} content"),
            enabled: true,
        }
    }

    #[test]
    fn tags_are_parsed_and_removed() {
        let (names, cleaned) = parse_skill_tags("Draft a reply /Formal  to Anna /short-v2 please");
        assert_eq!(names, vec!["formal", "short-v2"]);
        assert_eq!(cleaned, "Draft a reply to Anna please");
    }

    #[test]
    fn tag_only_message_cleans_to_empty() {
        let (names, cleaned) = parse_skill_tags("/summary");
        assert_eq!(names, vec!["summary"]);
        assert!(cleaned.is_empty());
    }

    #[test]
    fn tags_must_start_with_a_letter() {
        let (names, cleaned) = parse_skill_tags("ratio 3/4 is fine");
        assert!(names.is_empty());
        assert_eq!(cleaned, "ratio 3/4 is fine");
    }

    #[test]
    fn mode_sections_differ() {
        let ctx = PromptContext::default();
        assert!(build_system_prompt(AgentMode::Ask, &ctx, &[], &[]).contains("MODE: READ-ONLY"));
        assert!(build_system_prompt(AgentMode::Plan, &ctx, &[], &[]).contains("MODE: PLANNING"));
        let agent = build_system_prompt(AgentMode::Agent, &ctx, &[], &[]);
        assert!(agent.contains("MODE: FULL ACCESS"));
        assert!(!agent.contains("CONTEXT:"));
    }

    #[test]
    fn context_block_names_user_and_org() {
        let ctx = PromptContext {
            user_name: Some("Ada Lovelace".into()),
            username: Some("ada".into()),
            organization: Some("Analytical Engines".into()),
        };
        let prompt = build_system_prompt(AgentMode::Agent, &ctx, &[], &[]);
        assert!(prompt.contains("\nCONTEXT:\nUser: Ada Lovelace (@ada)\nOrganization: Analytical Engines\n"));

        let handle_only = PromptContext {
            username: Some("ada".into()),
            ..PromptContext::default()
        };
        assert!(context_block(&handle_only).contains("User: ada (@ada)"));
    }

    #[test]
    fn skill_sections_follow_kind() {
        let mut disabled = skill("old", SkillKind::Knowledge);
        disabled.enabled = false;
        let skills = vec![
            skill("voice", SkillKind::Knowledge),
            skill("pricing", SkillKind::Tool),
            skill("summary", SkillKind::OnDemand),
            disabled,
        ];

        let plain = build_system_prompt(AgentMode::Agent, &PromptContext::default(), &skills, &[]);
        assert!(plain.contains("=== KNOWLEDGE (ALWAYS APPLY) ===\n"));
        assert!(plain.contains("### VOICE\nContext: voice context\n\nvoice content"));
        assert!(!plain.contains("### OLD"));
        assert!(plain.contains("- \"pricing context\" (/pricing)"));
        assert!(!plain.contains("INVOKED SKILLS"));

        let invoked = invoked_skills(&skills, &["summary".to_string(), "missing".to_string()]);
        assert_eq!(invoked.len(), 1);
        let with_invoked =
            build_system_prompt(AgentMode::Agent, &PromptContext::default(), &skills, &invoked);
        assert!(with_invoked.contains("### /SUMMARY (INVOKED BY USER)"));
    }
}
