use crate::models::{CandidateFilter, Gender, Profile};

const ALL: &str = "all";

/// Normalize an optional filter label; `None` when absent, blank or "all"
fn active_label(label: Option<&str>) -> Option<&str> {
    label
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case(ALL))
}

/// Check a candidate profile against the attribute filters of a search
///
/// Each filter is a no-op when it is absent or set to "all". Breed compares
/// case-insensitively; a missing activity level counts as 0.
#[inline]
pub fn matches_filters(profile: &Profile, filter: &CandidateFilter) -> bool {
    if let Some(label) = active_label(filter.user_gender.as_deref()) {
        if profile.user_gender != Gender::from_label(label) {
            return false;
        }
    }

    if let Some(breed) = active_label(filter.pet_breed.as_deref()) {
        if !profile.pet_breed.trim().eq_ignore_ascii_case(breed) {
            return false;
        }
    }

    let activity = profile.activity_level.unwrap_or(0);
    if let Some(min) = filter.min_activity_level {
        if activity < min {
            return false;
        }
    }
    if let Some(max) = filter.max_activity_level {
        if activity > max {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_profile(gender: Gender, breed: &str, activity: Option<i32>) -> Profile {
        Profile {
            id: 1,
            user_id: 10,
            user_name: "Test User".to_string(),
            user_avatar: None,
            user_gender: gender,
            pet_name: "Bori".to_string(),
            pet_breed: breed.to_string(),
            pet_age: Some(3),
            pet_gender: None,
            pet_photo: None,
            bio: None,
            activity_level: activity,
            latitude: Some(37.5665),
            longitude: Some(126.9780),
            location: None,
            is_online: true,
            is_active: true,
            last_active_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches() {
        let profile = create_test_profile(Gender::Unset, "unset", None);
        assert!(matches_filters(&profile, &CandidateFilter::default()));
    }

    #[test]
    fn test_gender_filter() {
        let profile = create_test_profile(Gender::Female, "Poodle", Some(3));
        let mut filter = CandidateFilter::default();

        filter.user_gender = Some("FEMALE".to_string());
        assert!(matches_filters(&profile, &filter));

        filter.user_gender = Some("male".to_string());
        assert!(!matches_filters(&profile, &filter));

        filter.user_gender = Some("all".to_string());
        assert!(matches_filters(&profile, &filter));
    }

    #[test]
    fn test_breed_filter_is_case_insensitive() {
        let profile = create_test_profile(Gender::Male, "Poodle", Some(3));
        let mut filter = CandidateFilter::default();

        filter.pet_breed = Some("poodle".to_string());
        assert!(matches_filters(&profile, &filter));

        filter.pet_breed = Some("Shiba".to_string());
        assert!(!matches_filters(&profile, &filter));
    }

    #[test]
    fn test_missing_activity_counts_as_zero() {
        let profile = create_test_profile(Gender::Male, "Poodle", None);
        let mut filter = CandidateFilter::default();

        filter.max_activity_level = Some(2);
        assert!(matches_filters(&profile, &filter));

        filter.min_activity_level = Some(1);
        assert!(!matches_filters(&profile, &filter));
    }
}
