use tracing::{info, warn};

use poppang_common::{CandidateEvent, EnrichedEvent, RetryConfig};

use crate::retry::with_retry;
use crate::run_log::{EventKind, RunLog};
use crate::stats::RunStats;
use crate::traits::Geocoder;

/// Long administrative names → the short forms used for display.
const REGION_SHORT_FORMS: [(&str, &str); 19] = [
    ("서울특별시", "서울"),
    ("부산광역시", "부산"),
    ("대구광역시", "대구"),
    ("인천광역시", "인천"),
    ("광주광역시", "광주"),
    ("대전광역시", "대전"),
    ("울산광역시", "울산"),
    ("세종특별자치시", "세종"),
    ("경기도", "경기"),
    ("충청북도", "충북"),
    ("충청남도", "충남"),
    ("전북특별자치도", "전북"),
    ("전라북도", "전북"),
    ("전라남도", "전남"),
    ("경상북도", "경북"),
    ("경상남도", "경남"),
    ("제주특별자치도", "제주"),
    ("강원특별자치도", "강원"),
    ("강원도", "강원"),
];

/// Short forms that name a province-level area rather than a city.
const PROVINCES: [&str; 9] = [
    "경기", "강원", "충북", "충남", "전북", "전남", "경북", "경남", "제주",
];

/// Shorten province/metropolitan names and drop the `시` suffix from the city token.
///
/// The city token is the first word, or the second when the first names a province:
/// `경기도 성남시 분당구` → `경기 성남 분당구`, `수원시 팔달구` → `수원 팔달구`.
pub fn normalize_address(address: &str) -> String {
    let mut out = address.to_string();
    for (long, short) in REGION_SHORT_FORMS {
        out = out.replace(long, short);
    }

    let mut tokens: Vec<String> = out.split_whitespace().map(str::to_string).collect();
    let city = match tokens.first() {
        Some(first) if PROVINCES.contains(&first.as_str()) => 1,
        _ => 0,
    };
    if let Some(token) = tokens.get_mut(city) {
        if token.chars().count() > 1 {
            if let Some(stripped) = token.strip_suffix('시') {
                *token = stripped.to_string();
            }
        }
    }
    tokens.join(" ")
}

/// Geocode each candidate. Events without both coordinates are dropped.
pub async fn enrich(
    geocoder: &dyn Geocoder,
    events: Vec<CandidateEvent>,
    retry: RetryConfig,
    stats: &mut RunStats,
    run_log: &mut RunLog,
) -> Vec<EnrichedEvent> {
    let mut enriched = Vec::with_capacity(events.len());

    for event in events {
        let Some(query) = event.search_query().map(str::to_string) else {
            warn!(name = event.name.as_str(), "No geocoding query or address, dropping");
            stats.geocode_dropped += 1;
            run_log.log(EventKind::CandidateDropped {
                name: event.name.clone(),
                reason: "no geocoding query".to_string(),
            });
            continue;
        };

        let result = with_retry("geocode", retry, || geocoder.geocode(&query)).await;
        let matched = match result {
            Ok(Some(m)) => m,
            Ok(None) => {
                warn!(query = query.as_str(), "Geocoding found no match, dropping");
                stats.geocode_dropped += 1;
                run_log.log(EventKind::Geocode {
                    query,
                    matched: false,
                });
                continue;
            }
            Err(e) => {
                warn!(query = query.as_str(), error = %e, "Geocoding failed, dropping");
                stats.geocode_dropped += 1;
                run_log.log(EventKind::Geocode {
                    query,
                    matched: false,
                });
                continue;
            }
        };

        let (Some(longitude), Some(latitude)) = (matched.longitude, matched.latitude) else {
            warn!(query = query.as_str(), "Geocoding match lacks coordinates, dropping");
            stats.geocode_dropped += 1;
            run_log.log(EventKind::Geocode {
                query,
                matched: false,
            });
            continue;
        };

        let address = matched
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&event.address);
        let road_address = normalize_address(address);

        stats.geocoded += 1;
        run_log.log(EventKind::Geocode {
            query,
            matched: true,
        });
        enriched.push(EnrichedEvent {
            candidate: event,
            road_address,
            longitude,
            latitude,
        });
    }

    info!(enriched = enriched.len(), "Geocoding complete");
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, MockGeocoder};
    use crate::traits::GeoMatch;

    const NO_DELAY: RetryConfig = RetryConfig {
        max_retries: 1,
        delay_ms: 0,
    };

    #[test]
    fn province_and_city_suffixes() {
        assert_eq!(
            normalize_address("경기도 성남시 분당구 판교역로 146"),
            "경기 성남 분당구 판교역로 146"
        );
        assert_eq!(
            normalize_address("서울특별시 성동구 연무장길 10"),
            "서울 성동구 연무장길 10"
        );
        assert_eq!(normalize_address("수원시 팔달구 매산로"), "수원 팔달구 매산로");
        assert_eq!(
            normalize_address("제주특별자치도 제주시 첨단로"),
            "제주 제주 첨단로"
        );
        assert_eq!(normalize_address("시 청사"), "시 청사");
        assert_eq!(normalize_address(""), "");
    }

    #[tokio::test]
    async fn resolved_events_carry_both_coordinates() {
        let geocoder = MockGeocoder::new().on_query(
            "경기 현대백화점 판교",
            GeoMatch {
                address: Some("경기도 성남시 분당구 판교역로 146".into()),
                longitude: Some(127.1118),
                latitude: Some(37.3925),
            },
        );
        let mut event = candidate("현대 팝업");
        event.geocoding_query = Some("경기 현대백화점 판교".into());

        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "t".into());
        let out = enrich(&geocoder, vec![event], NO_DELAY, &mut stats, &mut log).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].road_address, "경기 성남 분당구 판교역로 146");
        assert_eq!(out[0].longitude, 127.1118);
        assert_eq!(stats.geocoded, 1);
    }

    #[tokio::test]
    async fn unresolved_or_partial_matches_are_dropped() {
        let geocoder = MockGeocoder::new()
            .on_query(
                "서울 반쪽",
                GeoMatch {
                    address: Some("서울 어딘가".into()),
                    longitude: Some(127.0),
                    latitude: None,
                },
            )
            .failing_on("서울 장애");

        let mut partial = candidate("반쪽");
        partial.geocoding_query = Some("서울 반쪽".into());
        let mut unknown = candidate("없음");
        unknown.geocoding_query = Some("서울 없는곳".into());
        let mut broken = candidate("장애");
        broken.geocoding_query = Some("서울 장애".into());
        let mut empty = candidate("빈칸");
        empty.geocoding_query = None;
        empty.address = String::new();

        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "t".into());
        let out = enrich(
            &geocoder,
            vec![partial, unknown, broken, empty],
            NO_DELAY,
            &mut stats,
            &mut log,
        )
        .await;

        assert!(out.is_empty());
        assert_eq!(stats.geocode_dropped, 4);
        // the failing query is retried once; the empty one never reaches the oracle
        assert_eq!(geocoder.queries().len(), 4);
    }

    #[tokio::test]
    async fn falls_back_to_event_address_for_display() {
        let geocoder = MockGeocoder::new().on_query(
            "부산 신세계 센텀시티",
            GeoMatch {
                address: None,
                longitude: Some(129.129),
                latitude: Some(35.169),
            },
        );
        let mut event = candidate("센텀 팝업");
        event.geocoding_query = None;
        event.address = "부산 신세계 센텀시티".into();

        let mut stats = RunStats::default();
        let mut log = RunLog::new("r".into(), "t".into());
        let out = enrich(&geocoder, vec![event], NO_DELAY, &mut stats, &mut log).await;

        assert_eq!(out[0].road_address, "부산 신세계 센텀시티");
    }
}
