use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AirtableRecord;
use crate::utils::{parse_float_lenient, parse_int_lenient, truthy};

/// A row of the `inventario_cache` table as written by the data sync.
/// Keyed on `record_id`. Descriptive columns are copied through as the
/// source holds them; numeric columns are coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRow {
    pub record_id: String,
    pub title: Option<Value>,
    pub slug: Option<Value>,
    pub marca: Option<Value>,
    pub modelo: Option<Value>,
    pub autoano: i64,
    pub precio: f64,
    pub kilometraje: i64,
    pub autotransmision: Option<Value>,
    pub combustible: Option<Value>,
    pub ordenstatus: Option<Value>,
    pub vendido: bool,
    pub separado: bool,
    pub ubicacion: Option<Value>,
    pub vin: Option<Value>,
    pub consigna: bool,
    pub clasificacionid: Option<Value>,
    pub viewcount: i64,
    #[serde(rename = "AutoMotor")]
    pub auto_motor: Option<Value>,
    pub cilindros: Option<Value>,
    pub ordencompra: Option<Value>,
    pub ingreso_inventario: Option<Value>,
    pub descripcion: Option<Value>,
    pub formulafinanciamiento: Option<Value>,
    pub garantia: Option<Value>,
    pub feature_image: Vec<String>,
    pub mensualidad_minima: f64,
    pub mensualidad_recomendada: f64,
    pub enganchemin: f64,
    pub enganche_recomendado: f64,
    pub plazomax: i64,
    pub numero_duenos: i64,
    pub fotos_exterior_url: Vec<String>,
    pub fotos_interior_url: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parse the source's `CreatedAt` cell: RFC 3339 timestamps or plain dates.
fn parse_created_at(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl InventoryRow {
    pub fn from_record(record: &AirtableRecord, now: DateTime<Utc>) -> Self {
        let raw = |name: &str| record.field(name).cloned();
        let number = |name: &str| record.field(name).map(parse_float_lenient).unwrap_or(0.0);
        let integer = |name: &str| record.field(name).map(parse_int_lenient).unwrap_or(0);

        Self {
            record_id: record.id.clone(),
            title: raw("Auto"),
            slug: raw("slug"),
            marca: raw("Marca"),
            modelo: raw("Modelo"),
            autoano: integer("AutoAño"),
            precio: number("Precio"),
            kilometraje: integer("kilometraje"),
            autotransmision: raw("Transmision"),
            combustible: raw("Combustible"),
            ordenstatus: raw("OrdenStatus"),
            vendido: truthy(record.field("Vendido")),
            separado: truthy(record.field("Separado")),
            ubicacion: raw("Ubicacion"),
            vin: raw("vin"),
            consigna: truthy(record.field("consigna")),
            clasificacionid: raw("ClasificacionID"),
            viewcount: integer("viewCount"),
            auto_motor: raw("AutoMotor"),
            cilindros: raw("AutoCilindros"),
            ordencompra: raw("OrdenCompra"),
            ingreso_inventario: raw("ingreso_inventario"),
            descripcion: raw("descripcion"),
            formulafinanciamiento: raw("FormulaFinanciamiento"),
            garantia: raw("garantia"),
            feature_image: record.list("feature_image_url"),
            mensualidad_minima: number("mensualidad_minima"),
            mensualidad_recomendada: number("mensualidad_recomendada"),
            enganchemin: number("enganche_minimo"),
            enganche_recomendado: number("enganche_recomendado"),
            plazomax: integer("PlazoMax"),
            numero_duenos: integer("numero_duenos"),
            fotos_exterior_url: record.list("fotos_exterior_url"),
            fotos_interior_url: record.list("fotos_interior_url"),
            created_at: parse_created_at(record.field("CreatedAt")).unwrap_or(now),
            updated_at: now,
        }
    }
}

/// Partial row written by the image mirror once a record's photos live in
/// the storage bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSyncUpdate {
    pub record_id: String,
    pub feature_image_url: Option<String>,
    pub fotos_exterior_url: Option<String>,
    pub fotos_interior_url: Option<String>,
    pub last_synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> AirtableRecord {
        serde_json::from_value(json!({"id": "recQ9", "fields": fields})).expect("record fixture")
    }

    #[test]
    fn test_row_from_record() {
        let now = Utc::now();
        let rec = record(json!({
            "Auto": "Toyota Corolla SE 2022",
            "Marca": "Toyota",
            "AutoAño": "2,022",
            "Precio": "389,500.00",
            "kilometraje": "21,800",
            "OrdenStatus": "Comprado",
            "Vendido": true,
            "enganche_minimo": "77,900",
            "PlazoMax": 48,
            "AutoMotor": "2.0L",
            "feature_image_url": "https://img/1.jpg, https://img/2.jpg",
            "fotos_interior_url": "",
            "CreatedAt": "2025-01-15"
        }));

        let row = InventoryRow::from_record(&rec, now);
        assert_eq!(row.record_id, "recQ9");
        assert_eq!(row.title, Some(json!("Toyota Corolla SE 2022")));
        assert_eq!(row.autoano, 2022);
        assert_eq!(row.precio, 389_500.0);
        assert_eq!(row.kilometraje, 21_800);
        assert_eq!(row.enganchemin, 77_900.0);
        assert_eq!(row.plazomax, 48);
        assert!(row.vendido);
        assert!(!row.separado);
        assert!(!row.consigna);
        assert_eq!(row.viewcount, 0);
        assert_eq!(row.feature_image, vec!["https://img/1.jpg", "https://img/2.jpg"]);
        assert!(row.fotos_interior_url.is_empty());
        assert_eq!(row.created_at.format("%Y-%m-%d").to_string(), "2025-01-15");
        assert_eq!(row.updated_at, now);
    }

    #[test]
    fn test_row_serializes_source_column_names() {
        let rec = record(json!({"AutoMotor": "1.6L"}));
        let value = serde_json::to_value(InventoryRow::from_record(&rec, Utc::now()))
            .expect("serialize row");
        assert_eq!(value["AutoMotor"], json!("1.6L"));
        assert_eq!(value["marca"], Value::Null);
        assert_eq!(value["precio"], json!(0.0));
    }

    #[test]
    fn test_created_at_fallback() {
        let now = Utc::now();
        let rec = record(json!({"CreatedAt": "ayer"}));
        assert_eq!(InventoryRow::from_record(&rec, now).created_at, now);
    }
}
