use crate::modules::protocol::{Language, StyleTheme};

pub const STYLE_PRESETS: &[&str] = &[
    "Casual weekend",
    "Business formal",
    "Summer beach",
    "Night out",
    "Streetwear",
    "Boho chic",
];

pub const REMOVE_BACKGROUND_PROMPT: &str = r#"Remove the background from this photo of a person.
Keep the person exactly as they are: same pose, face, body, hair and clothing.
Place them on a plain, evenly lit, pure white studio background.
Return only the edited image."#;

const TRY_ON_BASE: &str = r#"You are a virtual fitting room.
The FIRST image shows a person. The SECOND image shows a clothing item.
Dress the person in the clothing item from the second image.
Preserve the person's identity, face, body shape, skin tone, hair and pose.
Match the garment's colour, pattern, texture and cut faithfully; fit it naturally to the body with realistic folds and shadows.
Do not add other garments or accessories that are not in the inputs."#;

const TRY_ON_REALISTIC: &str = r#"STYLE: photorealistic. Keep the original lighting and camera perspective so the result looks like an untouched photograph."#;

const TRY_ON_MAGAZINE: &str = r#"STYLE: fashion magazine cover. Use polished editorial lighting, a clean backdrop and a confident cover pose framing. Leave space at the top for a masthead but do not render any text."#;

const TRY_ON_ARTISTIC: &str = r#"STYLE: artistic illustration. Render the dressed person as a tasteful painterly fashion illustration with expressive brush strokes while keeping the garment recognisable."#;

pub fn try_on_prompt(theme: StyleTheme) -> String {
    let style = match theme {
        StyleTheme::Realistic => TRY_ON_REALISTIC,
        StyleTheme::MagazineCover => TRY_ON_MAGAZINE,
        StyleTheme::Artistic => TRY_ON_ARTISTIC,
    };
    format!("{TRY_ON_BASE}\n\n{style}\n\nReturn only the final image.")
}

pub fn clothing_image_prompt(description: &str, theme: StyleTheme) -> String {
    let framing = match theme {
        StyleTheme::Realistic => "a realistic e-commerce product photo",
        StyleTheme::MagazineCover => "a glossy editorial still-life photo",
        StyleTheme::Artistic => "a stylised fashion sketch",
    };
    format!(
        "Create {framing} of a single clothing item on a plain white background, no person, no mannequin, no text.\nITEM: {}",
        description.trim()
    )
}

pub fn suggestions_prompt(prompt: &str, language: Language, preferred_colors: Option<&str>) -> String {
    let mut out = format!(
        "You are a personal stylist. Suggest 3 distinct clothing items that fit this style request: \"{}\".\n",
        prompt.trim()
    );
    if let Some(colors) = preferred_colors.map(str::trim).filter(|c| !c.is_empty()) {
        out.push_str(&format!("Prefer these colours where it makes sense: {colors}.\n"));
    }
    out.push_str(&format!(
        "Write every name and description in {}.\n",
        language.english_name()
    ));
    out.push_str(
        "Each description must be detailed enough to generate a product image (garment type, colour, material, cut).\n",
    );
    out.push_str(
        "OUTPUT FORMAT (JSON): [ { \"name\": \"short unique name\", \"description\": \"...\" }, ... ] ONLY output valid JSON.",
    );
    out
}
