use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{
    dedup_preserving_order, is_valid_image_url, opt_string, parse_float_lenient,
    parse_int_lenient, slugify, split_list, truthy,
};

/// Title used when a row carries neither a title nor make/model/year.
pub const UNTITLED_VEHICLE: &str = "Auto sin título";

/// Branch codes stored in the inventory and their display names.
const BRANCHES: [(&str, &str); 4] = [
    ("MTY", "Monterrey"),
    ("GPE", "Guadalupe"),
    ("TMPS", "Reynosa"),
    ("COAH", "Saltillo"),
];

/// Display name for a branch code ("mty" -> "Monterrey").
/// Unknown codes are returned trimmed.
pub fn branch_name(code: &str) -> String {
    let trimmed = code.trim();
    BRANCHES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Branch code for a display name ("Monterrey" -> "MTY").
/// Unknown names pass through unchanged.
pub fn branch_code(name: &str) -> String {
    BRANCHES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(code, _)| code.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// A vehicle listing in the fixed shape the storefront renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Vehicle {
    pub id: i64,
    pub slug: String,
    pub ordencompra: Option<String>,
    pub record_id: Option<String>,

    pub titulo: String,
    pub descripcion: Option<String>,
    pub metadescripcion: Option<String>,
    pub marca: Option<String>,
    pub modelo: Option<String>,
    pub autoano: i64,
    pub kilometraje: i64,
    pub transmision: Option<String>,
    pub combustible: Option<String>,
    pub carroceria: Option<String>,
    pub cilindros: i64,
    pub garantia: Option<String>,

    pub precio: f64,
    pub enganchemin: f64,
    pub enganche_recomendado: f64,
    pub mensualidad_minima: f64,
    pub mensualidad_recomendada: f64,
    pub plazomax: i64,

    #[serde(default)]
    pub feature_image: Vec<String>,
    #[serde(default)]
    pub galeria_exterior: Vec<String>,
    #[serde(default)]
    pub galeria_interior: Vec<String>,

    #[serde(default)]
    pub ubicacion: Vec<String>,

    pub vendido: bool,
    pub separado: bool,
    pub ordenstatus: Option<String>,

    #[serde(default)]
    pub clasificacionid: Vec<String>,
    #[serde(default)]
    pub promociones: Vec<String>,
    #[serde(default)]
    pub view_count: i64,
}

/// One page of listings plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct VehiclePage {
    pub vehicles: Vec<Vehicle>,
    pub total_count: u64,
}

fn image_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn valid_images(urls: Vec<String>) -> Vec<String> {
    dedup_preserving_order(
        urls.into_iter()
            .filter(|u| is_valid_image_url(u))
            .map(|u| u.trim().to_string()),
    )
}

impl Vehicle {
    /// Normalize one row of the inventory cache table.
    /// Returns None for rows that are not JSON objects.
    pub fn from_row(row: &Value) -> Option<Self> {
        let item = row.as_object()?;
        let get = |key: &str| item.get(key);
        let text = |key: &str| opt_string(item.get(key));
        let number = |key: &str| item.get(key).map(parse_float_lenient).unwrap_or(0.0);
        let integer = |key: &str| item.get(key).map(parse_int_lenient).unwrap_or(0);

        let marca = text("marca");
        let modelo = text("modelo");
        let titulo = text("title").unwrap_or_else(|| {
            let year = get("autoano").and_then(|v| opt_string(Some(v))).unwrap_or_default();
            let composed = format!(
                "{} {} {}",
                marca.as_deref().unwrap_or_default(),
                modelo.as_deref().unwrap_or_default(),
                year
            );
            let composed = composed.trim();
            if composed.is_empty() {
                UNTITLED_VEHICLE.to_string()
            } else {
                composed.to_string()
            }
        });
        let slug = text("slug").unwrap_or_else(|| slugify(&titulo));

        let clasificacionid = match get("clasificacionid") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            other @ Some(Value::String(_)) => split_list(other),
            _ => Vec::new(),
        };

        let ubicacion = split_list(get("ubicacion"))
            .iter()
            .map(|code| branch_name(code))
            .filter(|name| !name.is_empty())
            .collect();

        let feature_image = get("feature_image_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .into_iter()
            .chain(image_list(get("feature_image")))
            .chain(image_list(get("fotos_exterior_url")))
            .find(|u| is_valid_image_url(u))
            .map(|u| vec![u.trim().to_string()])
            .unwrap_or_default();

        let mut exterior = image_list(get("fotos_exterior_url"));
        exterior.extend(image_list(get("galeria_exterior")));

        let promociones = match get("promociones") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let view_count = get("viewcount")
            .or_else(|| get("view_count"))
            .map(parse_int_lenient)
            .unwrap_or(0);

        Some(Self {
            id: integer("id"),
            slug,
            ordencompra: text("ordencompra"),
            record_id: text("record_id"),
            titulo,
            descripcion: text("descripcion"),
            metadescripcion: text("metadescripcion"),
            marca,
            modelo,
            autoano: integer("autoano"),
            kilometraje: integer("kilometraje"),
            transmision: text("transmision"),
            combustible: text("combustible"),
            carroceria: text("carroceria"),
            cilindros: integer("cilindros"),
            garantia: text("garantia"),
            precio: number("precio"),
            enganchemin: number("enganchemin"),
            enganche_recomendado: number("enganche_recomendado"),
            mensualidad_minima: number("mensualidad_minima"),
            mensualidad_recomendada: number("mensualidad_recomendada"),
            plazomax: integer("plazomax"),
            feature_image,
            galeria_exterior: valid_images(exterior),
            galeria_interior: valid_images(image_list(get("fotos_interior_url"))),
            ubicacion,
            vendido: truthy(get("vendido")),
            separado: truthy(get("separado")),
            ordenstatus: text("ordenstatus"),
            clasificacionid,
            promociones,
            view_count,
        })
    }

    /// Cover image, if the listing has one.
    pub fn cover(&self) -> Option<&str> {
        self.feature_image.first().map(String::as_str)
    }
}

/// Normalize a batch of rows, skipping nulls and non-objects.
pub fn normalize_vehicles(rows: &[Value]) -> Vec<Vehicle> {
    rows.iter().filter_map(Vehicle::from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_branch_mapping() {
        assert_eq!(branch_name(" mty "), "Monterrey");
        assert_eq!(branch_name("COAH"), "Saltillo");
        assert_eq!(branch_name("Cancún "), "Cancún");
        assert_eq!(branch_code("Reynosa"), "TMPS");
        assert_eq!(branch_code("Cancún"), "Cancún");
    }

    #[test]
    fn test_normalize_full_row() {
        let row = json!({
            "id": 812,
            "record_id": "recA1b2C3",
            "ordencompra": "OC-1042",
            "title": "Mazda 3 Sedán i Sport 2020",
            "slug": "mazda-3-sedan-i-sport-2020",
            "marca": "Mazda",
            "modelo": "3",
            "autoano": "2020",
            "precio": "329,900",
            "kilometraje": "48,250",
            "enganchemin": "65,980.00",
            "mensualidad_minima": 7450.5,
            "plazomax": "60",
            "cilindros": "4",
            "feature_image_url": "https://cdn.example.com/812/cover.jpg",
            "fotos_exterior_url": [
                "https://cdn.example.com/812/ext1.jpg",
                "not-a-url",
                "https://cdn.example.com/812/ext1.jpg"
            ],
            "galeria_exterior": ["https://cdn.example.com/812/ext2.jpg"],
            "fotos_interior_url": ["https://cdn.example.com/812/int1.jpg", ""],
            "ubicacion": "MTY, gpe",
            "clasificacionid": [3, "7"],
            "vendido": false,
            "separado": 1,
            "ordenstatus": "Comprado",
            "promociones": ["Bono de enganche"],
            "viewcount": "41"
        });

        let v = Vehicle::from_row(&row).expect("row is an object");
        assert_eq!(v.id, 812);
        assert_eq!(v.titulo, "Mazda 3 Sedán i Sport 2020");
        assert_eq!(v.autoano, 2020);
        assert_eq!(v.precio, 329_900.0);
        assert_eq!(v.kilometraje, 48_250);
        assert_eq!(v.enganchemin, 65_980.0);
        assert_eq!(v.mensualidad_minima, 7450.5);
        assert_eq!(v.plazomax, 60);
        assert_eq!(v.cover(), Some("https://cdn.example.com/812/cover.jpg"));
        assert_eq!(
            v.galeria_exterior,
            vec![
                "https://cdn.example.com/812/ext1.jpg",
                "https://cdn.example.com/812/ext2.jpg"
            ]
        );
        assert_eq!(v.galeria_interior, vec!["https://cdn.example.com/812/int1.jpg"]);
        assert_eq!(v.ubicacion, vec!["Monterrey", "Guadalupe"]);
        assert_eq!(v.clasificacionid, vec!["3", "7"]);
        assert!(!v.vendido);
        assert!(v.separado);
        assert_eq!(v.view_count, 41);
        assert_eq!(v.promociones, vec!["Bono de enganche"]);
    }

    #[test]
    fn test_normalize_title_and_slug_fallbacks() {
        let v = Vehicle::from_row(&json!({"id": 1, "marca": "Kia", "modelo": "Rio", "autoano": 2019}))
            .expect("object");
        assert_eq!(v.titulo, "Kia Rio 2019");
        assert_eq!(v.slug, "kia-rio-2019");

        let v = Vehicle::from_row(&json!({"id": 2})).expect("object");
        assert_eq!(v.titulo, UNTITLED_VEHICLE);
        assert_eq!(v.slug, "auto-sin-titulo");
        assert_eq!(v.precio, 0.0);
        assert!(v.feature_image.is_empty());
    }

    #[test]
    fn test_feature_image_falls_back_to_exterior() {
        let v = Vehicle::from_row(&json!({
            "id": 3,
            "feature_image_url": "   ",
            "feature_image": ["relative.jpg"],
            "fotos_exterior_url": ["https://cdn.example.com/3/ext.jpg"]
        }))
        .expect("object");
        assert_eq!(v.feature_image, vec!["https://cdn.example.com/3/ext.jpg"]);
    }

    #[test]
    fn test_clasificacion_from_string() {
        let v = Vehicle::from_row(&json!({"id": 4, "clasificacionid": "suv, ,familiar"}))
            .expect("object");
        assert_eq!(v.clasificacionid, vec!["suv", "familiar"]);
    }

    #[test]
    fn test_normalize_skips_nulls() {
        let rows = vec![json!(null), json!({"id": 5}), json!("junk")];
        let vehicles = normalize_vehicles(&rows);
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].id, 5);
    }
}
