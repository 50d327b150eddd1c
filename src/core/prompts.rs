//! Prompt builders for negotiation turns, agreement checks and the arbiter.

use crate::models::{Agent, Profile, Turn};

/// Appended to every turn prompt
pub const RESPONSE_CONSTRAINTS: &str = "Important: Only output your final response. \
Do not include any hidden chain of thought. \
Keep your response concise (1-2 sentences) and natural.";

pub const AGREEMENT_SYSTEM: &str =
    "You read mentorship conversations and report whether the mentee has made an explicit decision.";

pub const DECISION_SYSTEM: &str = "You are a thoughtful mentee making an important decision about which mentor to work with. \
Carefully consider each mentor's profile and your conversation with them.";

/// How many trailing messages the continuation prompt quotes
const CONTINUATION_CONTEXT: usize = 3;

/// How many trailing messages of each transcript the arbiter sees
const DECISION_EXCERPT: usize = 4;

fn list(items: &[String]) -> String {
    items.join(", ")
}

/// System prompt for the mentor side of a session
pub fn mentor_system(mentor: &Agent, mentee: &Agent) -> String {
    let me = &mentor.profile;
    let other = &mentee.profile;
    format!(
        "You are {name}, a mentor with {years} years of experience in {skills}.\n\
         Your communication style is {style} and you're available on {availability}.\n\n\
         You're currently talking to {other_name}, a mentee who is interested in {interests}.\n\
         Their goals include: {other_goals}\n\n\
         Your goals for this mentorship:\n- {goals}\n\n\
         Guidelines: Be professional but personable; be specific about what you can offer; \
         suggest concrete next steps; avoid repetition. \
         You are only interested in the previously provided goals. \
         You should not pretend to be an expert outside of what your profession outlines. \
         Try to sell yourself as best you can, but do not lie about your capabilities. \
         You only have knowledge about things in your profession.",
        name = mentor.name(),
        years = me.experience,
        skills = list(&me.skills),
        style = me.communication_style,
        availability = list(&me.availability),
        other_name = mentee.name(),
        interests = list(&other.interests),
        other_goals = list(&other.goals),
        goals = me.goals.join("; "),
    )
}

/// System prompt for the mentee side of a session
pub fn mentee_system(mentee: &Agent, mentor: &Agent) -> String {
    let me = &mentee.profile;
    let other = &mentor.profile;
    format!(
        "You are {name}, a mentee with {years} years of experience in {skills}.\n\
         Your communication style is {style} and you're available on {availability}.\n\n\
         You're talking to {other_name}, a potential mentor with expertise in {other_skills}.\n\
         Their goals include: {other_goals}\n\n\
         Your goals for this mentorship:\n- {goals}\n\n\
         Guidelines: Be clear about what you hope to learn; ask specific questions; discuss fit; avoid repetition. \
         You are searching for the best mentor possible for you. \
         If the compatibility between you and this mentor is not strong, do NOT be agreeable. \
         Do not decide on your first replies; question the mentor for several turns. \
         Once you have made up your mind, explicitly state whether you want to work with the mentor \
         or that you do NOT want to work with the mentor.",
        name = mentee.name(),
        years = me.experience,
        skills = list(&me.skills),
        style = me.communication_style,
        availability = list(&me.availability),
        other_name = mentor.name(),
        other_skills = list(&other.skills),
        other_goals = list(&other.goals),
        goals = me.goals.join("; "),
    )
}

/// User prompt for the first turn of a session
pub fn opening() -> String {
    format!(
        "Start the mentorship conversation.\n\
         - Briefly introduce yourself (1 sentence)\n\
         - Mention 1-2 specific ways you can help\n\
         - Explain why you would be the BEST mentor. Do NOT lie about your background; strictly adhere to your profile.\n\
         - Do not talk about scheduling or meeting times, only compatibility\n\n\
         {}",
        RESPONSE_CONSTRAINTS
    )
}

/// User prompt for every turn after the first
pub fn continuation(turns: &[Turn]) -> String {
    let start = turns.len().saturating_sub(CONTINUATION_CONTEXT);
    let context = turns[start..]
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Continue the conversation considering:\n{}\n\n\
         Guidelines:\n\
         1) Acknowledge specifically\n\
         2) Discuss compatibility as a mentor/mentee only, nothing else\n\
         3) <= 3 sentences\n\
         4) Avoid repetition\n\
         5) Do not talk about scheduling or meeting times, only compatibility\n\n\
         {}",
        context, RESPONSE_CONSTRAINTS
    )
}

/// Yes/no style query used by the model-backed agreement policy
pub fn agreement_query(exchange: &str) -> String {
    format!(
        "Based on this conversation between a mentor and mentee, has the mentee explicitly said \
         that they want to work with the mentor, or explicitly said that they do not?\n\
         Answer with exactly one word: ACCEPT, REJECT or UNDECIDED.\n\n\
         Recent conversation:\n{}",
        exchange
    )
}

/// One successfully negotiated option as presented to the arbiter
pub struct DecisionOption<'a> {
    pub mentor_id: &'a str,
    pub name: &'a str,
    pub profile: &'a Profile,
    pub score: f64,
    pub transcript: &'a [Turn],
}

/// Structured selection request over several successful negotiations
pub fn decision(mentee: &Profile, options: &[DecisionOption<'_>]) -> String {
    let descriptions = options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let start = option.transcript.len().saturating_sub(DECISION_EXCERPT);
            let excerpt = option.transcript[start..]
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "Mentor {n}: {name} (id: {id})\n\
                 - Skills: {skills}\n\
                 - Experience: {years} years\n\
                 - Communication style: {style}\n\
                 - Availability: {availability}\n\
                 - Initial compatibility: {score:.1}%\n\
                 - Conversation summary: {excerpt}",
                n = i + 1,
                name = option.name,
                id = option.mentor_id,
                skills = list(&option.profile.skills),
                years = option.profile.experience,
                style = option.profile.communication_style,
                availability = list(&option.profile.availability),
                score = option.score * 100.0,
                excerpt = excerpt,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a mentee who has successfully negotiated with multiple potential mentors. \
         Choose the best mentor based solely on compatibility, your conversations and their profiles. \
         Do not discuss scheduling. Be critical of each mentor.\n\n\
         Your profile:\n\
         - Experience: {years} years in {skills}\n\
         - Interests: {interests}\n\
         - Goals: {goals}\n\
         - Communication style: {style}\n\n\
         Available mentors:\n{descriptions}\n\n\
         Analyze each mentor's profile and your conversation with them, then make your selection.\n\
         Return your response as a JSON object with the following format:\n\
         {{\"decision\": \"<mentor id>\", \"reasoning\": \"<your reasoning>\"}}",
        years = mentee.experience,
        skills = list(&mentee.skills),
        interests = list(&mentee.interests),
        goals = list(&mentee.goals),
        style = mentee.communication_style,
        descriptions = descriptions,
    )
}
