//! Notification wording.
//!
//! Wording is cosmetic: nothing here influences *when* a reminder fires.
//! A [`ContentStrategy`] turns a reminder plus a [`MessageStyle`] into a
//! title and body; [`StylePicker`] resolves the configured preference,
//! including the weighted `mixed` mode, into a concrete style per firing.

use crate::reminder::{Reminder, Target};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Tone of a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStyle {
    Plain,
    Motivational,
    /// Teasing, "roast me" phrasing.
    Adversarial,
}

impl MessageStyle {
    pub fn all() -> [MessageStyle; 3] {
        [Self::Plain, Self::Motivational, Self::Adversarial]
    }
}

/// Configured style preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePreference {
    #[default]
    Plain,
    Motivational,
    Adversarial,
    /// Pick per firing according to [`StyleWeights`].
    Mixed,
}

/// Relative weights for [`StylePreference::Mixed`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleWeights {
    pub plain: u32,
    pub motivational: u32,
    pub adversarial: u32,
}

impl Default for StyleWeights {
    fn default() -> Self {
        Self {
            plain: 2,
            motivational: 2,
            adversarial: 1,
        }
    }
}

/// Title and body of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

/// Produces wording for a reminder.
pub trait ContentStrategy: Send + Sync {
    fn compose(&self, reminder: &Reminder, style: MessageStyle) -> NotificationContent;
}

/// Built-in phrase tables, rotated per call.
#[derive(Debug, Default)]
pub struct PhraseBook {
    cursor: Mutex<usize>,
}

const HABIT_PLAIN: &[&str] = &["Time for {name}.", "Reminder: {name}."];
const HABIT_MOTIVATIONAL: &[&str] = &[
    "Small steps add up. Time for {name}!",
    "Keep the streak alive: {name}.",
    "Future you will thank you for {name}.",
];
const HABIT_ADVERSARIAL: &[&str] = &[
    "Still haven't done {name}? Bold strategy.",
    "{name} won't do itself. Neither will you, apparently.",
];
const WATER_PLAIN: &[&str] = &["Time to drink some water."];
const WATER_MOTIVATIONAL: &[&str] = &[
    "Hydrated brains think faster. Grab a glass!",
    "A glass of water now keeps the slump away.",
];
const WATER_ADVERSARIAL: &[&str] = &[
    "Your houseplants drink more water than you.",
    "Cactus cosplay is not a lifestyle. Drink up.",
];

impl PhraseBook {
    fn next_index(&self, len: usize) -> usize {
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let index = *cursor % len.max(1);
        *cursor = cursor.wrapping_add(1);
        index
    }
}

impl ContentStrategy for PhraseBook {
    fn compose(&self, reminder: &Reminder, style: MessageStyle) -> NotificationContent {
        let name = reminder.display_name();
        let (title, table) = match (&reminder.target, style) {
            (Target::Hydration, MessageStyle::Plain) => ("Hydration".to_owned(), WATER_PLAIN),
            (Target::Hydration, MessageStyle::Motivational) => {
                ("Hydration".to_owned(), WATER_MOTIVATIONAL)
            }
            (Target::Hydration, MessageStyle::Adversarial) => {
                ("Hydration".to_owned(), WATER_ADVERSARIAL)
            }
            (Target::Habit(_), MessageStyle::Plain) => (name.clone(), HABIT_PLAIN),
            (Target::Habit(_), MessageStyle::Motivational) => (name.clone(), HABIT_MOTIVATIONAL),
            (Target::Habit(_), MessageStyle::Adversarial) => (name.clone(), HABIT_ADVERSARIAL),
        };
        let template = table[self.next_index(table.len())];
        NotificationContent {
            title,
            body: template.replace("{name}", &name),
        }
    }
}

/// Resolves a [`StylePreference`] into a concrete style.
#[derive(Debug, Clone)]
pub struct StylePicker {
    preference: StylePreference,
    weights: Option<WeightedIndex<u32>>,
}

impl StylePicker {
    /// All-zero weights make `mixed` degrade to plain.
    pub fn new(preference: StylePreference, weights: StyleWeights) -> Self {
        let weights =
            WeightedIndex::new([weights.plain, weights.motivational, weights.adversarial]).ok();
        Self {
            preference,
            weights,
        }
    }

    /// Style for one firing; a per-reminder override wins.
    pub fn pick<R: Rng + ?Sized>(&self, reminder: &Reminder, rng: &mut R) -> MessageStyle {
        if let Some(style) = reminder.style {
            return style;
        }
        match self.preference {
            StylePreference::Plain => MessageStyle::Plain,
            StylePreference::Motivational => MessageStyle::Motivational,
            StylePreference::Adversarial => MessageStyle::Adversarial,
            StylePreference::Mixed => match &self.weights {
                Some(dist) => MessageStyle::all()[dist.sample(rng)],
                None => MessageStyle::Plain,
            },
        }
    }
}
