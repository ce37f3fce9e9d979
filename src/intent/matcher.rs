//! Rule-based contextual replies
//!
//! Categories are tried in a fixed order and the first match wins. The order
//! is the tie-breaking policy: "what's the date and time" resolves as a date
//! query because the date predicate runs before the combined one.

use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use rand::Rng;

use super::arithmetic;

/// Reply categories in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Date,
    Time,
    DateTime,
    Math,
    Capabilities,
    Knowledge,
    Weather,
    Greeting,
    Status,
    Identity,
    Assistance,
    AiTopic,
    Gratitude,
    Farewell,
}

impl Intent {
    /// Every category, in the order they are evaluated
    pub const ALL: [Intent; 14] = [
        Intent::Date,
        Intent::Time,
        Intent::DateTime,
        Intent::Math,
        Intent::Capabilities,
        Intent::Knowledge,
        Intent::Weather,
        Intent::Greeting,
        Intent::Status,
        Intent::Identity,
        Intent::Assistance,
        Intent::AiTopic,
        Intent::Gratitude,
        Intent::Farewell,
    ];

    /// Test this category against lowercased, trimmed text
    fn matches(&self, lower: &str) -> bool {
        let any = |cues: &[&str]| cues.iter().any(|cue| lower.contains(cue));

        match self {
            Intent::Date => any(&["date", "today"]),
            Intent::Time => any(&["time", "clock"]),
            Intent::DateTime => any(&["date and time", "current date and time"]),
            Intent::Math => arithmetic::is_math_question(lower),
            Intent::Capabilities => any(&[
                "core functions",
                "what can you do",
                "how can you help",
                "what are your capabilities",
            ]),
            Intent::Knowledge => lower.contains("prime minister") && lower.contains("india"),
            Intent::Weather => lower.contains("weather"),
            Intent::Greeting => any(&["hello", "hi", "hey"]),
            Intent::Status => any(&["how are you", "how do you feel"]),
            Intent::Identity => any(&["your name", "who are you"]),
            Intent::Assistance => any(&["how can you assist", "how can you help"]),
            Intent::AiTopic => any(&["ai", "artificial intelligence"]),
            Intent::Gratitude => any(&["thank", "thanks"]),
            Intent::Farewell => any(&["bye", "goodbye", "see you"]),
        }
    }
}

/// First matching category for the text, if any
pub fn classify(text: &str) -> Option<Intent> {
    let lower = text.trim().to_lowercase();
    Intent::ALL.into_iter().find(|intent| intent.matches(&lower))
}

pub const GREETINGS: &[&str] = &[
    "Hello! I'm {persona}, nice to meet you!",
    "Hi there! How can I help you today?",
    "Hey! Great to see you. What's on your mind?",
    "Hello! I'm here and ready to chat.",
];

pub const STATUS_REPLIES: &[&str] = &[
    "I'm doing well, thank you for asking! How are you?",
    "I'm great! Always excited to learn and chat.",
    "I'm feeling good and ready to help you with anything!",
    "I'm wonderful, thanks! What brings you here today?",
];

pub const GRATITUDE_REPLIES: &[&str] = &[
    "You're very welcome! Happy to help.",
    "My pleasure! Is there anything else you'd like to know?",
    "You're welcome! I'm here whenever you need me.",
    "Glad I could help! Feel free to ask me anything else.",
];

pub const FAREWELLS: &[&str] = &[
    "Goodbye! It was great chatting with you!",
    "See you later! Take care!",
    "Bye! Hope to talk with you again soon!",
    "Farewell! Have a wonderful day!",
];

pub const CLARIFICATIONS: &[&str] = &[
    "I'd be happy to help! Could you be a bit more specific about what you're looking for?",
    "That's an interesting topic. What would you like to know about it specifically?",
    "I can help with questions about dates, times, basic math, and general conversation. What would you like to explore?",
    "Feel free to ask me about the current date and time, simple calculations, or just chat with me!",
    "I'm here to help! Try asking me about today's date, the time, or any other questions you have.",
];

const CAPABILITIES_REPLY: &str = "I can help you with various tasks! I can answer questions about the current date and time, perform basic math calculations, have conversations, provide general information, and assist with everyday questions. I'm designed to be a friendly AI companion. What would you like to know or discuss?";

const KNOWLEDGE_REPLY: &str = "As of my last update, Narendra Modi is the Prime Minister of India. He has been in office since 2014. However, for the most current information, I'd recommend checking recent news sources.";

const WEATHER_REPLY: &str = "I don't have access to current weather data, but you can check your local weather app or website for the most accurate information!";

const IDENTITY_REPLY: &str =
    "I'm {persona}, your AI companion! I'm here to chat, help, and hopefully brighten your day.";

const ASSISTANCE_REPLY: &str = "I can assist you in several ways! I can answer questions about dates and times, help with basic math, provide information on various topics, have conversations, and just be a friendly companion. What would you like help with today?";

const AI_TOPIC_REPLY: &str = "AI is fascinating! I'm an example of conversational AI designed to chat and help users. Is there something specific about AI you'd like to discuss?";

/// Pick one variant uniformly at random
pub fn pick<'a, R: Rng + ?Sized>(variants: &[&'a str], rng: &mut R) -> &'a str {
    variants.choose(rng).copied().unwrap_or_default()
}

fn format_date(now: &NaiveDateTime) -> String {
    now.format("%A, %B %-d, %Y").to_string()
}

fn format_time(now: &NaiveDateTime) -> String {
    now.format("%-I:%M %p").to_string()
}

/// Produces canned and templated replies for a named persona
#[derive(Debug, Clone)]
pub struct ContextualResponder {
    persona: String,
}

impl ContextualResponder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    /// Reply to the text. Total: unmatched input gets a clarification
    /// variant.
    pub fn reply<R: Rng + ?Sized>(&self, text: &str, now: NaiveDateTime, rng: &mut R) -> String {
        match classify(text) {
            Some(intent) => self.reply_for(intent, text, now, rng),
            None => pick(CLARIFICATIONS, rng).to_string(),
        }
    }

    /// Reply for an already classified intent
    pub fn reply_for<R: Rng + ?Sized>(
        &self,
        intent: Intent,
        text: &str,
        now: NaiveDateTime,
        rng: &mut R,
    ) -> String {
        let reply = match intent {
            Intent::Date => format!("Today is {}.", format_date(&now)),
            Intent::Time => format!("It's currently {}.", format_time(&now)),
            Intent::DateTime => format!(
                "Today is {}, and it's currently {}.",
                format_date(&now),
                format_time(&now)
            ),
            Intent::Math => arithmetic::evaluate(text),
            Intent::Capabilities => CAPABILITIES_REPLY.to_string(),
            Intent::Knowledge => KNOWLEDGE_REPLY.to_string(),
            Intent::Weather => WEATHER_REPLY.to_string(),
            Intent::Greeting => pick(GREETINGS, rng).to_string(),
            Intent::Status => pick(STATUS_REPLIES, rng).to_string(),
            Intent::Identity => IDENTITY_REPLY.to_string(),
            Intent::Assistance => ASSISTANCE_REPLY.to_string(),
            Intent::AiTopic => AI_TOPIC_REPLY.to_string(),
            Intent::Gratitude => pick(GRATITUDE_REPLIES, rng).to_string(),
            Intent::Farewell => pick(FAREWELLS, rng).to_string(),
        };
        self.personalize(&reply)
    }

    /// Fill in the persona name
    pub fn personalize(&self, template: &str) -> String {
        template.replace("{persona}", &self.persona)
    }
}
