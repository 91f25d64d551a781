//! Translation of inventory filters into PostgREST query parameters.
//!
//! The read side only ever lists vehicles whose purchase order status is
//! `Comprado`. Everything else is optional and additive.

use crate::models::{branch_code, VehicleFilters};

/// Listings per page.
pub const VEHICLES_PER_PAGE: u64 = 20;

/// Only purchased vehicles are for sale.
pub const LISTED_STATUS: &str = "Comprado";

pub type QueryParams = Vec<(String, String)>;

/// Quote a value for use inside a PostgREST list or logic tree when it
/// contains reserved characters.
fn quote(value: &str) -> String {
    if value.contains([',', '(', ')', '"', '\\', '{', '}']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn in_list<T: ToString>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(&v.to_string())).collect();
    format!("in.({})", items.join(","))
}

fn push(params: &mut QueryParams, column: &str, filter: String) {
    params.push((column.to_string(), filter));
}

/// Map a storefront sort key to a column ("price" -> "precio").
fn order_column(field: &str) -> &str {
    match field {
        "price" => "precio",
        "year" => "autoano",
        "mileage" => "kilometraje",
        other => other,
    }
}

/// Column and direction for `orderby` ("price-asc"). Without one, newest
/// updates come first.
pub fn order_clause(orderby: Option<&str>) -> String {
    match orderby.filter(|o| !o.is_empty()) {
        Some(orderby) => {
            let (field, direction) = orderby.split_once('-').unwrap_or((orderby, ""));
            let direction = if direction == "asc" { "asc" } else { "desc" };
            format!("{}.{}", order_column(field), direction)
        }
        None => "updated_at.desc".to_string(),
    }
}

/// Offset and limit for a 1-based page number. Page 0 is treated as page 1.
pub fn page_bounds(page: u64) -> (u64, u64) {
    let page = page.max(1);
    ((page - 1) * VEHICLES_PER_PAGE, VEHICLES_PER_PAGE)
}

/// Build the listing query for `filters` and `page`.
pub fn build_vehicle_query(filters: &VehicleFilters, page: u64) -> QueryParams {
    let mut params = QueryParams::new();
    push(&mut params, "select", "*".to_string());
    push(&mut params, "ordenstatus", format!("eq.{}", LISTED_STATUS));

    if filters.hide_separado {
        push(&mut params, "separado", "not.is.true".to_string());
    }

    let lists: [(&str, Vec<String>); 6] = [
        ("marca", filters.marca.clone()),
        ("autoano", filters.autoano.iter().map(i64::to_string).collect()),
        ("transmision", filters.transmision.clone()),
        ("combustible", filters.combustible.clone()),
        ("garantia", filters.garantia.clone()),
        ("carroceria", filters.carroceria.clone()),
    ];
    for (column, values) in lists.iter() {
        if !values.is_empty() {
            push(&mut params, column, in_list(values));
        }
    }

    if !filters.ubicacion.is_empty() {
        let codes: Vec<String> = filters.ubicacion.iter().map(|name| branch_code(name)).collect();
        push(&mut params, "ubicacion", in_list(&codes));
    }

    if !filters.promotion.is_empty() {
        let items: Vec<String> = filters.promotion.iter().map(|p| quote(p)).collect();
        push(&mut params, "promociones", format!("ov.{{{}}}", items.join(",")));
    }

    // Zero bounds are treated as unset.
    let ranges = [
        ("precio", "gte", filters.min_price),
        ("precio", "lte", filters.max_price),
        ("enganchemin", "gte", filters.enganchemin),
        ("enganchemin", "lte", filters.max_enganche),
    ];
    for (column, op, bound) in ranges {
        if let Some(bound) = bound.filter(|b| *b != 0.0) {
            push(&mut params, column, format!("{}.{}", op, bound));
        }
    }

    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = quote(&format!("*{}*", search));
        push(
            &mut params,
            "and",
            format!(
                "(or(title.ilike.{p},marca.ilike.{p},modelo.ilike.{p}))",
                p = pattern
            ),
        );
    }

    let (offset, limit) = page_bounds(page);
    push(&mut params, "offset", offset.to_string());
    push(&mut params, "limit", limit.to_string());
    push(&mut params, "order", order_clause(filters.orderby.as_deref()));

    params
}

/// Cache key identifying one page of one filter set.
pub fn cache_key(filters: &VehicleFilters, page: u64) -> String {
    let filters_json = serde_json::to_string(filters).unwrap_or_else(|_| "{}".to_string());
    format!("vehicles_{}_{}", filters_json, page.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(params: &'a QueryParams, key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_query() {
        let params = build_vehicle_query(&VehicleFilters::default(), 1);
        assert_eq!(value(&params, "ordenstatus"), Some("eq.Comprado"));
        assert_eq!(value(&params, "offset"), Some("0"));
        assert_eq!(value(&params, "limit"), Some("20"));
        assert_eq!(value(&params, "order"), Some("updated_at.desc"));
        assert!(value(&params, "separado").is_none());
        assert!(value(&params, "and").is_none());
    }

    #[test]
    fn test_list_and_range_filters() {
        let filters = VehicleFilters {
            marca: vec!["Chevrolet".into(), "Kia".into()],
            autoano: vec![2021, 2022],
            ubicacion: vec!["Monterrey".into(), "Saltillo".into(), "Cancún".into()],
            min_price: Some(150_000.0),
            max_price: Some(0.0),
            max_enganche: Some(50_000.0),
            hide_separado: true,
            ..Default::default()
        };
        let params = build_vehicle_query(&filters, 3);
        assert_eq!(value(&params, "marca"), Some("in.(Chevrolet,Kia)"));
        assert_eq!(value(&params, "autoano"), Some("in.(2021,2022)"));
        assert_eq!(value(&params, "ubicacion"), Some("in.(MTY,COAH,Cancún)"));
        assert_eq!(value(&params, "separado"), Some("not.is.true"));
        assert_eq!(value(&params, "offset"), Some("40"));

        let precio: Vec<&str> = params
            .iter()
            .filter(|(k, _)| k == "precio")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(precio, vec!["gte.150000"]);
        assert_eq!(value(&params, "enganchemin"), Some("lte.50000"));
    }

    #[test]
    fn test_search_and_promotions() {
        let filters = VehicleFilters {
            search: Some(" jetta ".into()),
            promotion: vec!["Bono, 10%".into(), "Tasa fija".into()],
            ..Default::default()
        };
        let params = build_vehicle_query(&filters, 1);
        assert_eq!(
            value(&params, "and"),
            Some("(or(title.ilike.*jetta*,marca.ilike.*jetta*,modelo.ilike.*jetta*))")
        );
        assert_eq!(value(&params, "promociones"), Some("ov.{\"Bono, 10%\",Tasa fija}"));
    }

    #[test]
    fn test_order_clause() {
        assert_eq!(order_clause(Some("price-asc")), "precio.asc");
        assert_eq!(order_clause(Some("year-desc")), "autoano.desc");
        assert_eq!(order_clause(Some("mileage")), "kilometraje.desc");
        assert_eq!(order_clause(Some("enganchemin-asc")), "enganchemin.asc");
        assert_eq!(order_clause(Some("")), "updated_at.desc");
        assert_eq!(order_clause(None), "updated_at.desc");
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(0), (0, 20));
        assert_eq!(page_bounds(1), (0, 20));
        assert_eq!(page_bounds(4), (60, 20));
    }

    #[test]
    fn test_cache_key_is_stable() {
        let filters = VehicleFilters {
            marca: vec!["Kia".into()],
            ..Default::default()
        };
        assert_eq!(cache_key(&filters, 2), r#"vehicles_{"marca":["Kia"]}_2"#);
        assert_eq!(cache_key(&VehicleFilters::default(), 0), "vehicles_{}_1");
    }
}
