use serde::{Deserialize, Serialize};

/// Stored in place of a menu when the upstream has nothing for a school.
pub const NO_MENU: &str = "급식 정보 없음";

/// One school's lunch for a day, keyed by (date, school_code).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Meal {
    pub school_code: String,
    pub school_name: String,
    pub lunch_menu: String,
}

impl Meal {
    pub fn has_menu(&self) -> bool {
        !self.lunch_menu.is_empty() && self.lunch_menu != NO_MENU
    }
}

/// Generated review, keyed by (date, school_code).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Review {
    pub review_text: String,
    pub nutri_score: f64,
    pub pref_score: f64,
    #[serde(default)]
    pub error_flag: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct School {
    pub code: String,
    pub name: String,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Reactions {
    pub likes: u64,
}

#[derive(Serialize, Debug)]
pub struct ReviewResponse {
    pub review: String,
    pub nutri_score: f64,
    pub pref_score: f64,
    pub reactions: Reactions,
}

#[derive(Serialize, Debug)]
pub struct ReactionResponse {
    pub school_code: String,
    pub likes: u64,
}

#[derive(Serialize, Debug)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct DateWindow {
    pub dates: Vec<String>,
    pub selected_date: String,
}

/// Frames pushed to every realtime client.
#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ConnectionCount { count: usize },
    Reaction { school_code: String, likes: u64 },
}
