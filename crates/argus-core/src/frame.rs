use ndarray::Array2;

/// A single FITS header card value.
#[derive(Clone, Debug, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CardValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CardValue::Integer(v) => Some(*v as f64),
            CardValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CardValue::Integer(v) => Some(*v),
            CardValue::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CardValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered FITS header: keyword/value cards plus HISTORY and COMMENT lines.
///
/// Card order is preserved across load/save so that downstream tools see the
/// header they wrote. Structural cards (SIMPLE, BITPIX, NAXIS*, END) are not
/// stored here; the writer regenerates them from the data shape.
#[derive(Clone, Debug, Default)]
pub struct FitsHeader {
    cards: Vec<(String, CardValue)>,
    history: Vec<String>,
    comments: Vec<String>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, keyword: &str) -> Option<&CardValue> {
        self.cards.iter().find(|(k, _)| k == keyword).map(|(_, v)| v)
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(CardValue::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(CardValue::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(CardValue::as_str)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.cards.iter().any(|(k, _)| k == keyword)
    }

    /// Insert or replace a card, keeping the original position on replace.
    pub fn set(&mut self, keyword: &str, value: CardValue) {
        if let Some(slot) = self.cards.iter_mut().find(|(k, _)| k == keyword) {
            slot.1 = value;
        } else {
            self.cards.push((keyword.to_string(), value));
        }
    }

    pub fn remove(&mut self, keyword: &str) {
        self.cards.retain(|(k, _)| k != keyword);
    }

    pub fn cards(&self) -> impl Iterator<Item = (&str, &CardValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn push_history(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn push_comment(&mut self, line: impl Into<String>) {
        self.comments.push(line.into());
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// True when the header carries the reference coordinate keys a celestial
    /// WCS needs. Matches the pipeline's plate-solve success criterion.
    pub fn has_celestial_wcs(&self) -> bool {
        self.contains("CRVAL1") && self.contains("CRVAL2")
    }
}

/// A 2D FITS image: float pixel data plus its header.
/// Pixel data is row-major with shape (height, width); NaN is permitted only
/// as the non-overlap sentinel after alignment.
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub data: Array2<f32>,
    pub header: FitsHeader,
}

impl FitsImage {
    pub fn new(data: Array2<f32>, header: FitsHeader) -> Self {
        Self { data, header }
    }

    pub fn from_data(data: Array2<f32>) -> Self {
        Self {
            data,
            header: FitsHeader::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}
