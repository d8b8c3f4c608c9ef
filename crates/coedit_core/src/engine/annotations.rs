use super::{ensure_user, Document};
use crate::buffer::TextBuffer;
use crate::error::EngineError;
use crate::models::{new_id, Annotation, TextRange, UserId};
use chrono::Utc;

impl<B: TextBuffer> Document<B> {
    /// Attach a note to `[index, index + length)`.
    ///
    /// Annotations are metadata: they take no lock, produce no change record
    /// and keep their original offsets when text shifts around them.
    ///
    /// # Errors
    /// [`EngineError::Validation`] for an empty user, an empty kind or an
    /// out-of-bounds range.
    pub fn annotate(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
        text: &str,
        kind: &str,
    ) -> Result<Annotation, EngineError> {
        ensure_user(user)?;
        if kind.trim().is_empty() {
            return Err(EngineError::validation("annotation kind must not be empty"));
        }
        let range = TextRange::new(index, length);
        if range.end() > self.buffer.len() {
            return Err(EngineError::validation(format!(
                "annotation range {} is out of bounds for document length {}",
                range,
                self.buffer.len()
            )));
        }
        let annotation = Annotation {
            annotation_id: new_id("note"),
            user_id: user.clone(),
            index,
            length,
            text: text.to_string(),
            kind: kind.to_string(),
            created_at: Utc::now(),
        };
        self.annotations
            .insert(annotation.annotation_id.clone(), annotation.clone());
        Ok(annotation)
    }

    pub fn annotation(&self, annotation_id: &str) -> Option<&Annotation> {
        self.annotations.get(annotation_id)
    }

    /// Annotations in creation order, optionally only those of `kind`.
    pub fn annotations(&self, kind: Option<&str>) -> Vec<Annotation> {
        self.annotations
            .values()
            .filter(|annotation| kind.map_or(true, |wanted| annotation.kind == wanted))
            .cloned()
            .collect()
    }

    pub fn delete_annotation(&mut self, annotation_id: &str) -> Result<Annotation, EngineError> {
        self.annotations
            .shift_remove(annotation_id)
            .ok_or_else(|| EngineError::not_found("annotation", annotation_id))
    }
}
