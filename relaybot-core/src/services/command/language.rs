use serde::Serialize;

/// A language a `language` parameter can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub iso6391: &'static str,
    pub iso6393: &'static str,
    pub name: &'static str,
}

const LANGUAGES: &[Language] = &[
    Language { iso6391: "ar", iso6393: "ara", name: "Arabic" },
    Language { iso6391: "bg", iso6393: "bul", name: "Bulgarian" },
    Language { iso6391: "ca", iso6393: "cat", name: "Catalan" },
    Language { iso6391: "cs", iso6393: "ces", name: "Czech" },
    Language { iso6391: "da", iso6393: "dan", name: "Danish" },
    Language { iso6391: "de", iso6393: "deu", name: "German" },
    Language { iso6391: "el", iso6393: "ell", name: "Greek" },
    Language { iso6391: "en", iso6393: "eng", name: "English" },
    Language { iso6391: "eo", iso6393: "epo", name: "Esperanto" },
    Language { iso6391: "es", iso6393: "spa", name: "Spanish" },
    Language { iso6391: "et", iso6393: "est", name: "Estonian" },
    Language { iso6391: "fa", iso6393: "fas", name: "Persian" },
    Language { iso6391: "fi", iso6393: "fin", name: "Finnish" },
    Language { iso6391: "fr", iso6393: "fra", name: "French" },
    Language { iso6391: "he", iso6393: "heb", name: "Hebrew" },
    Language { iso6391: "hi", iso6393: "hin", name: "Hindi" },
    Language { iso6391: "hr", iso6393: "hrv", name: "Croatian" },
    Language { iso6391: "hu", iso6393: "hun", name: "Hungarian" },
    Language { iso6391: "id", iso6393: "ind", name: "Indonesian" },
    Language { iso6391: "is", iso6393: "isl", name: "Icelandic" },
    Language { iso6391: "it", iso6393: "ita", name: "Italian" },
    Language { iso6391: "ja", iso6393: "jpn", name: "Japanese" },
    Language { iso6391: "ko", iso6393: "kor", name: "Korean" },
    Language { iso6391: "la", iso6393: "lat", name: "Latin" },
    Language { iso6391: "lt", iso6393: "lit", name: "Lithuanian" },
    Language { iso6391: "lv", iso6393: "lav", name: "Latvian" },
    Language { iso6391: "nl", iso6393: "nld", name: "Dutch" },
    Language { iso6391: "no", iso6393: "nor", name: "Norwegian" },
    Language { iso6391: "pl", iso6393: "pol", name: "Polish" },
    Language { iso6391: "pt", iso6393: "por", name: "Portuguese" },
    Language { iso6391: "ro", iso6393: "ron", name: "Romanian" },
    Language { iso6391: "ru", iso6393: "rus", name: "Russian" },
    Language { iso6391: "sk", iso6393: "slk", name: "Slovak" },
    Language { iso6391: "sl", iso6393: "slv", name: "Slovenian" },
    Language { iso6391: "sr", iso6393: "srp", name: "Serbian" },
    Language { iso6391: "sv", iso6393: "swe", name: "Swedish" },
    Language { iso6391: "th", iso6393: "tha", name: "Thai" },
    Language { iso6391: "tr", iso6393: "tur", name: "Turkish" },
    Language { iso6391: "uk", iso6393: "ukr", name: "Ukrainian" },
    Language { iso6391: "vi", iso6393: "vie", name: "Vietnamese" },
    Language { iso6391: "zh", iso6393: "zho", name: "Chinese" },
];

/// Looks a language up by two- or three-letter ISO code or English name.
pub fn find_language(input: &str) -> Option<Language> {
    let needle = input.trim();
    LANGUAGES
        .iter()
        .find(|l| {
            l.iso6391.eq_ignore_ascii_case(needle)
                || l.iso6393.eq_ignore_ascii_case(needle)
                || l.name.eq_ignore_ascii_case(needle)
        })
        .copied()
}
