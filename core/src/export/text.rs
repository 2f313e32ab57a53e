/// The generated text, byte for byte.
pub fn to_text(full_text: &str) -> Vec<u8> {
    full_text.as_bytes().to_vec()
}
