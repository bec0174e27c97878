use crate::modules::protocol::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    RemovingBackground,
    GeneratingLook,
    FetchingSuggestions,
    GeneratingSuggestionImages,
    TryOnFailed,
    SuggestionsFailed,
}

pub fn text(lang: Language, key: Text) -> &'static str {
    match (lang, key) {
        (Language::En, Text::RemovingBackground) => "Removing background...",
        (Language::En, Text::GeneratingLook) => "Generating your look...",
        (Language::En, Text::FetchingSuggestions) => "Asking the stylist...",
        (Language::En, Text::GeneratingSuggestionImages) => "Drawing suggestions...",
        (Language::En, Text::TryOnFailed) => "Could not generate the look",
        (Language::En, Text::SuggestionsFailed) => "Could not get suggestions",

        (Language::Es, Text::RemovingBackground) => "Quitando el fondo...",
        (Language::Es, Text::GeneratingLook) => "Generando tu look...",
        (Language::Es, Text::FetchingSuggestions) => "Consultando al estilista...",
        (Language::Es, Text::GeneratingSuggestionImages) => "Dibujando sugerencias...",
        (Language::Es, Text::TryOnFailed) => "No se pudo generar el look",
        (Language::Es, Text::SuggestionsFailed) => "No se pudieron obtener sugerencias",

        (Language::Pt, Text::RemovingBackground) => "Removendo o fundo...",
        (Language::Pt, Text::GeneratingLook) => "Gerando seu look...",
        (Language::Pt, Text::FetchingSuggestions) => "Consultando o estilista...",
        (Language::Pt, Text::GeneratingSuggestionImages) => "Desenhando sugestões...",
        (Language::Pt, Text::TryOnFailed) => "Não foi possível gerar o look",
        (Language::Pt, Text::SuggestionsFailed) => "Não foi possível obter sugestões",

        (Language::Fr, Text::RemovingBackground) => "Suppression de l'arrière-plan...",
        (Language::Fr, Text::GeneratingLook) => "Création de votre look...",
        (Language::Fr, Text::FetchingSuggestions) => "Consultation du styliste...",
        (Language::Fr, Text::GeneratingSuggestionImages) => "Dessin des suggestions...",
        (Language::Fr, Text::TryOnFailed) => "Impossible de générer le look",
        (Language::Fr, Text::SuggestionsFailed) => "Impossible d'obtenir des suggestions",
    }
}
