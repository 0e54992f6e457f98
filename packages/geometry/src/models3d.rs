//! Lookup of photogrammetry 3D models for key greenspaces.
//!
//! The frontend ships one viewer folder per modelled site under
//! `3d_models/<folder>/index.html`. Greenspace names in the store do not
//! always match the folder names exactly, so matching falls back to a
//! case-insensitive substring test in either direction.
//!
//! The substring fallback can attach a model to an unrelated greenspace
//! whose name happens to contain (or be contained in) a table entry, e.g.
//! a site called just `"Park"`. That behaviour is kept as-is.

/// Greenspace name → model folder. Folder names are the on-disk spelling,
/// typos included.
const MODEL_FOLDERS: &[(&str, &str)] = &[
    ("Baberton Golf Course", "Baberton Golf Course"),
    ("Campbell Park", "Campbell Park"),
    ("Carrick Knowe Golf Course", "Carrick Knowe Golf Course"),
    (
        "Colinton and Craiglockhart Dells",
        "Colinton and Craiglockhart Dells",
    ),
    ("Kingsknowe Golf Course", "Kingsknowe Golf Course"),
    ("Oriam", "Oriam"),
    ("Red Hall Public Park", "Red Hall Publice Park"),
    ("Redhall Public Park", "Red Hall Publice Park"),
    ("Saughton Cemetery", "Saughton Cemetery"),
    ("Saughton Park", "Saughton Park"),
    ("Saughton Park and Gardens", "Saughton Park"),
    ("Spylaw Public Park", "Spylaw Public Park"),
];

/// Returns the model folder for a greenspace name, if any.
#[must_use]
pub fn model_folder(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return None;
    }

    if let Some((_, folder)) = MODEL_FOLDERS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
    {
        return Some(*folder);
    }

    let name_lower = name.to_lowercase();
    MODEL_FOLDERS
        .iter()
        .find(|(known, _)| {
            let known_lower = known.to_lowercase();
            name_lower.contains(&known_lower) || known_lower.contains(&name_lower)
        })
        .map(|(_, folder)| *folder)
}

/// Returns the viewer path (relative to the frontend root) for a
/// greenspace name, if a model exists.
#[must_use]
pub fn model_path(name: &str) -> Option<String> {
    model_folder(name).map(|folder| format!("3d_models/{folder}/index.html"))
}
