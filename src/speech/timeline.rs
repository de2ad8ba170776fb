/*!
Text to viseme timeline.

This is a heuristic, not a phoneme aligner. Each character gets a coarse mouth
shape and a uniform duration derived from a speaking rate, which is close enough
to look alive while the real audio plays.
*/

use super::Viseme;

pub const DEFAULT_WORDS_PER_MINUTE: f32 = 160.0;

const MIN_CHAR_MS: f64 = 40.0;
const MAX_CHAR_MS: f64 = 140.0;
/// Characters without a viseme still take up this fraction of a character.
const GAP_FACTOR: f64 = 0.6;
/// Same-shape segments closer than this are merged.
const MERGE_GAP_MS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeSegment {
    pub start_ms: f64,
    pub viseme: Viseme,
    pub duration_ms: f64,
}

impl VisemeSegment {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    pub fn contains(&self, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.start_ms && elapsed_ms < self.end_ms()
    }
}

/// Ordered viseme segments for one utterance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisemeTimeline {
    segments: Vec<VisemeSegment>,
}

impl VisemeTimeline {
    /// Build a timeline for `text` spoken at `words_per_minute`.
    ///
    /// Identical input always produces an identical timeline.
    pub fn build(text: &str, words_per_minute: f32) -> Self {
        let char_count = text.chars().count();
        if char_count == 0 || text.trim().is_empty() || words_per_minute <= 0.0 {
            return Self::default();
        }

        let words = text.split_whitespace().count().max(1) as f64;
        let total_ms = words / words_per_minute as f64 * 60_000.0;
        let per_char = (total_ms / char_count.max(10) as f64).clamp(MIN_CHAR_MS, MAX_CHAR_MS);

        let mut segments: Vec<VisemeSegment> = vec![];
        let mut t = 0.0;
        for c in text.chars() {
            let Some(viseme) = Viseme::from_char(c) else {
                t += per_char * GAP_FACTOR;
                continue;
            };

            match segments.last_mut() {
                Some(last) if last.viseme == viseme && t - last.end_ms() <= MERGE_GAP_MS => {
                    last.duration_ms = t + per_char - last.start_ms;
                }
                _ => segments.push(VisemeSegment {
                    start_ms: t,
                    viseme,
                    duration_ms: per_char,
                }),
            }
            t += per_char;
        }

        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VisemeSegment> {
        self.segments.iter()
    }

    pub fn segments(&self) -> &[VisemeSegment] {
        &self.segments
    }

    /// The segment covering `elapsed_ms`, if any. Gaps count as silence.
    pub fn segment_at(&self, elapsed_ms: f64) -> Option<&VisemeSegment> {
        self.segments.iter().find(|s| s.contains(elapsed_ms))
    }

    pub fn viseme_at(&self, elapsed_ms: f64) -> Option<Viseme> {
        self.segment_at(elapsed_ms).map(|s| s.viseme)
    }

    /// End of the last segment.
    pub fn total_ms(&self) -> f64 {
        self.segments.last().map(VisemeSegment::end_ms).unwrap_or_default()
    }
}

impl<'a> IntoIterator for &'a VisemeTimeline {
    type Item = &'a VisemeSegment;
    type IntoIter = std::slice::Iter<'a, VisemeSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
