use serde::{Deserialize, Serialize};

/// Entry returned by the storage folder listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Photo columns mirrored from the source into the storage bucket. The
/// column name doubles as the folder name under each vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageField {
    Feature,
    Exterior,
    Interior,
}

impl ImageField {
    pub const ALL: [ImageField; 3] = [ImageField::Feature, ImageField::Exterior, ImageField::Interior];

    pub fn column(&self) -> &'static str {
        match self {
            ImageField::Feature => "feature_image_url",
            ImageField::Exterior => "fotos_exterior_url",
            ImageField::Interior => "fotos_interior_url",
        }
    }
}

impl std::fmt::Display for ImageField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}
