use serde::Deserialize;

/// Naver returns `mapx`/`mapy` as WGS84 degrees scaled by 10^7.
const COORD_SCALE: f64 = 10_000_000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct LocalSearchResponse {
    #[serde(default)]
    pub items: Vec<LocalItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalItem {
    #[serde(default)]
    pub title: String,
    pub address: Option<String>,
    pub road_address: Option<String>,
    pub mapx: Option<String>,
    pub mapy: Option<String>,
}

impl LocalItem {
    /// Road address, falling back to the lot-number address. Blank strings count as absent.
    pub fn best_address(&self) -> Option<&str> {
        [self.road_address.as_deref(), self.address.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|a| !a.is_empty())
    }

    pub fn longitude(&self) -> Option<f64> {
        scaled(self.mapx.as_deref())
    }

    pub fn latitude(&self) -> Option<f64> {
        scaled(self.mapy.as_deref())
    }
}

fn scaled(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    Some(value / COORD_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_unscaled() {
        let item = LocalItem {
            mapx: Some("1271115340".to_string()),
            mapy: Some("373942860".to_string()),
            ..Default::default()
        };
        assert!((item.longitude().unwrap() - 127.111534).abs() < 1e-9);
        assert!((item.latitude().unwrap() - 37.394286).abs() < 1e-9);
    }

    #[test]
    fn blank_or_garbled_coordinates_are_missing() {
        let item = LocalItem {
            mapx: Some("".to_string()),
            mapy: Some("n/a".to_string()),
            ..Default::default()
        };
        assert_eq!(item.longitude(), None);
        assert_eq!(item.latitude(), None);
    }

    #[test]
    fn best_address_prefers_road_address() {
        let item: LocalItem = serde_json::from_str(
            r#"{"title": "<b>현대백화점</b> 판교점", "address": "경기도 성남시 분당구 백현동 541",
                "roadAddress": "경기도 성남시 분당구 판교역로146번길 20"}"#,
        )
        .unwrap();
        assert_eq!(item.best_address(), Some("경기도 성남시 분당구 판교역로146번길 20"));

        let lot_only = LocalItem {
            road_address: Some("  ".to_string()),
            address: Some("서울특별시 중구 명동2가 1".to_string()),
            ..Default::default()
        };
        assert_eq!(lot_only.best_address(), Some("서울특별시 중구 명동2가 1"));
    }
}
