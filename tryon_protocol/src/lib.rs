use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StyleTheme {
    #[default]
    Realistic,
    MagazineCover,
    Artistic,
}

impl StyleTheme {
    pub const ALL: [StyleTheme; 3] = [
        StyleTheme::Realistic,
        StyleTheme::MagazineCover,
        StyleTheme::Artistic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StyleTheme::Realistic => "realistic",
            StyleTheme::MagazineCover => "magazine_cover",
            StyleTheme::Artistic => "artistic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realistic" | "real" => Some(StyleTheme::Realistic),
            "magazine_cover" | "magazine-cover" | "magazine" | "cover" => {
                Some(StyleTheme::MagazineCover)
            }
            "artistic" | "art" => Some(StyleTheme::Artistic),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Es,
    Pt,
    Fr,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Pt => "pt",
            Language::Fr => "fr",
        }
    }

    /// Name used inside model instructions ("respond in ...").
    pub fn english_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish",
            Language::Pt => "Portuguese",
            Language::Fr => "French",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Language::En),
            "es" | "spanish" => Some(Language::Es),
            "pt" | "pt-br" | "portuguese" => Some(Language::Pt),
            "fr" | "french" => Some(Language::Fr),
            _ => None,
        }
    }
}

/// Image bytes as exchanged with the model: base64 payload plus MIME type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClothingSuggestion {
    pub name: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    /// Empty for entries written before ids existed.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created_at_ms: u64,
    pub person_preview: String,
    pub clothing_preview: String,
    pub result_preview: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub person_image: String,
    pub clothing_image: String,
    pub remove_background: bool,
    pub style_theme: StyleTheme,
}
