pub type Result<T> = std::result::Result<T, failure::Error>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

/// A row of the registration store. Read-only from the gate's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub slot: String,
    pub owner: Option<String>,
    pub contact: Option<String>,
}
