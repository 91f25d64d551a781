use serde::{Deserialize, Serialize};

/// Inventory search filters. Empty lists and unset ranges do not constrain
/// the query; serialization omits them so equal filter sets share a cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct VehicleFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marca: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autoano: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transmision: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combustible: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub garantia: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carroceria: Vec<String>,
    /// Branch display names ("Monterrey"), not codes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ubicacion: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub promotion: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enganchemin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_enganche: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide_separado: bool,
    /// `field-direction`, e.g. `price-asc` or `year-desc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
}

/// Names a single filter for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Marca,
    Autoano,
    Transmision,
    Combustible,
    Garantia,
    Carroceria,
    Ubicacion,
    Promotion,
    MinPrice,
    MaxPrice,
    Enganchemin,
    MaxEnganche,
    Search,
    HideSeparado,
    Orderby,
}

impl std::str::FromStr for FilterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "marca" => FilterKey::Marca,
            "autoano" => FilterKey::Autoano,
            "transmision" => FilterKey::Transmision,
            "combustible" => FilterKey::Combustible,
            "garantia" => FilterKey::Garantia,
            "carroceria" => FilterKey::Carroceria,
            "ubicacion" => FilterKey::Ubicacion,
            "promotion" => FilterKey::Promotion,
            "minprice" => FilterKey::MinPrice,
            "maxprice" => FilterKey::MaxPrice,
            "enganchemin" => FilterKey::Enganchemin,
            "maxenganche" => FilterKey::MaxEnganche,
            "search" => FilterKey::Search,
            "hideseparado" => FilterKey::HideSeparado,
            "orderby" => FilterKey::Orderby,
            other => return Err(format!("unknown filter: {}", other)),
        };
        Ok(key)
    }
}

/// Remove `value` from a list filter, or clear the whole list when no value
/// is given.
fn remove_from<T: ToString>(list: &mut Vec<T>, value: Option<&str>) {
    match value {
        Some(value) => list.retain(|item| item.to_string() != value),
        None => list.clear(),
    }
}

impl VehicleFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay every filter that `update` sets onto `self`. Unset values in
    /// `update` (empty lists, `None`, `hide_separado: false`) leave the
    /// current filter alone; use [`remove`](Self::remove) or
    /// [`clear`](Self::clear) to unset.
    pub fn merge(&mut self, update: VehicleFilters) {
        fn take_list<T>(dst: &mut Vec<T>, src: Vec<T>) {
            if !src.is_empty() {
                *dst = src;
            }
        }
        fn take_opt<T>(dst: &mut Option<T>, src: Option<T>) {
            if src.is_some() {
                *dst = src;
            }
        }
        take_list(&mut self.marca, update.marca);
        take_list(&mut self.autoano, update.autoano);
        take_list(&mut self.transmision, update.transmision);
        take_list(&mut self.combustible, update.combustible);
        take_list(&mut self.garantia, update.garantia);
        take_list(&mut self.carroceria, update.carroceria);
        take_list(&mut self.ubicacion, update.ubicacion);
        take_list(&mut self.promotion, update.promotion);
        take_opt(&mut self.min_price, update.min_price);
        take_opt(&mut self.max_price, update.max_price);
        take_opt(&mut self.enganchemin, update.enganchemin);
        take_opt(&mut self.max_enganche, update.max_enganche);
        take_opt(&mut self.search, update.search);
        take_opt(&mut self.orderby, update.orderby);
        if update.hide_separado {
            self.hide_separado = true;
        }
    }

    /// Drop one value from a list filter (the list disappears once empty) or
    /// reset a scalar filter.
    pub fn remove(&mut self, key: FilterKey, value: Option<&str>) {
        match key {
            FilterKey::Marca => remove_from(&mut self.marca, value),
            FilterKey::Autoano => remove_from(&mut self.autoano, value),
            FilterKey::Transmision => remove_from(&mut self.transmision, value),
            FilterKey::Combustible => remove_from(&mut self.combustible, value),
            FilterKey::Garantia => remove_from(&mut self.garantia, value),
            FilterKey::Carroceria => remove_from(&mut self.carroceria, value),
            FilterKey::Ubicacion => remove_from(&mut self.ubicacion, value),
            FilterKey::Promotion => remove_from(&mut self.promotion, value),
            FilterKey::MinPrice => self.min_price = None,
            FilterKey::MaxPrice => self.max_price = None,
            FilterKey::Enganchemin => self.enganchemin = None,
            FilterKey::MaxEnganche => self.max_enganche = None,
            FilterKey::Search => self.search = None,
            FilterKey::HideSeparado => self.hide_separado = false,
            FilterKey::Orderby => self.orderby = None,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
