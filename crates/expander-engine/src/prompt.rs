use expander_contracts::ratio::AspectRatio;

/// Outpainting instruction sent alongside the original.
pub fn default_prompt(ratio: AspectRatio) -> String {
    format!(
        "Expand this photo to a {ratio} aspect ratio by outpainting. \
         Keep every pixel of the original image exactly as it is and do not move, crop or rescale it. \
         Generate new content only in the added border area around it. \
         Continue the scene naturally and match the original lighting, perspective, texture and photographic style \
         so that the seams are invisible."
    )
}

/// Appends user guidance to the default instruction.
pub fn prompt_with_guidance(ratio: AspectRatio, guidance: Option<&str>) -> String {
    let base = default_prompt(ratio);
    match guidance.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => format!("{base} Additional guidance for the new area: {text}"),
        None => base,
    }
}
