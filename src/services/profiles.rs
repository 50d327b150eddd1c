use crate::models::{Agent, Profile};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when reading from the profile source
#[derive(Debug, Error)]
pub enum ProfileSourceError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Mentor as stored by the profile source
#[derive(Debug, Clone, Deserialize)]
pub struct MentorRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "max_mentees", alias = "maxMentees")]
    pub capacity: Option<u32>,
    #[serde(flatten)]
    pub profile: Profile,
}

impl MentorRecord {
    pub fn into_agent(self, default_capacity: u32) -> Agent {
        Agent::mentor(self.id, self.profile, self.capacity.unwrap_or(default_capacity))
    }
}

/// Onboarding document produced by resume/transcript ingestion
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OnboardingDocument {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub paragraph_text: Option<String>,
    pub resume_data: ResumeData,
    pub transcript_data: TranscriptData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResumeData {
    pub contact: Contact,
    pub skills: BTreeMap<String, Vec<String>>,
    pub experience: Vec<ExperienceEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranscriptData {
    pub courses_completed: Vec<Course>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Course {
    pub title: Option<String>,
}

const HOBBIES_HEADER: &str = "Hobbies and Interests:";
const MBTI_HEADER: &str = "Personality and MBTI:";
const CAREER_HEADER: &str = "Career Goals and Aspirations:";

/// Text following `header`, up to the first occurrence of `until` (if given)
fn section<'a>(text: &'a str, header: &str, until: Option<&str>) -> Option<&'a str> {
    let (_, rest) = text.split_once(header)?;
    let body = match until.and_then(|marker| rest.split_once(marker)) {
        Some((body, _)) => body,
        None => rest,
    };
    Some(body.trim()).filter(|s| !s.is_empty())
}

impl OnboardingDocument {
    pub fn mentee_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "mentee".to_string())
    }

    /// Build a scoring profile from the parsed documents.
    ///
    /// Sections of the free-text paragraph are located by their headers;
    /// anything absent stays empty.
    pub fn to_profile(&self) -> Profile {
        let paragraph = self.paragraph_text.as_deref().unwrap_or_default();

        let hobbies: Vec<String> = section(paragraph, HOBBIES_HEADER, Some("Personality"))
            .map(|s| vec![s.to_string()])
            .unwrap_or_default();
        let mbti = section(paragraph, MBTI_HEADER, Some("Career"))
            .map(str::to_string)
            .unwrap_or_default();
        let career_goals: Vec<String> = section(paragraph, CAREER_HEADER, None)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default();

        let skills = self.resume_data.skills.values().flatten().cloned().collect();
        let job_description = self
            .resume_data
            .experience
            .iter()
            .filter_map(|e| e.role.clone())
            .collect();
        let course_descriptions = self
            .transcript_data
            .courses_completed
            .iter()
            .filter_map(|c| c.title.clone())
            .collect();

        Profile {
            name: self.resume_data.contact.name.clone().unwrap_or_default(),
            hobbies: hobbies.clone(),
            life_interests: Vec::new(),
            mbti,
            career_interests: career_goals.clone(),
            course_descriptions,
            job_description,
            skills,
            experience: self.resume_data.experience.len() as u32,
            availability: Vec::new(),
            communication_style: String::new(),
            goals: career_goals,
            interests: hobbies,
        }
    }

    pub fn into_agent(self) -> Agent {
        let profile = self.to_profile();
        Agent::mentee(self.mentee_id(), profile)
    }
}

/// Client for the service that stores mentor records and onboarding documents
pub struct ProfileSourceClient {
    base_url: String,
    client: Client,
}

impl ProfileSourceClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ProfileSourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProfileSourceError> {
        tracing::debug!("Fetching profiles from: {}", url);
        let response = self.client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProfileSourceError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(ProfileSourceError::ApiError(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Fetch the full mentor pool
    pub async fn fetch_mentors(&self) -> Result<Vec<MentorRecord>, ProfileSourceError> {
        let json = self.get_json(&self.url("mentors")).await?;
        let records = json
            .as_array()
            .ok_or_else(|| ProfileSourceError::InvalidResponse("expected a mentor array".into()))?;

        // Skip malformed records rather than failing the whole pool
        let mentors: Vec<MentorRecord> = records
            .iter()
            .filter_map(|record| match serde_json::from_value(record.clone()) {
                Ok(mentor) => Some(mentor),
                Err(e) => {
                    tracing::warn!("Skipping malformed mentor record: {}", e);
                    None
                }
            })
            .collect();

        tracing::debug!("Fetched {} mentors ({} records)", mentors.len(), records.len());
        Ok(mentors)
    }

    /// Fetch one mentor by id
    pub async fn fetch_mentor(&self, mentor_id: &str) -> Result<MentorRecord, ProfileSourceError> {
        let url = format!(
            "{}?mentor_id={}",
            self.url("get-mentor"),
            urlencoding::encode(mentor_id)
        );
        let json = self.get_json(&url).await?;
        if json.is_null() {
            return Err(ProfileSourceError::NotFound(format!("Mentor {}", mentor_id)));
        }

        serde_json::from_value(json)
            .map_err(|e| ProfileSourceError::InvalidResponse(format!("Failed to parse mentor: {}", e)))
    }

    /// Fetch the most recently onboarded mentee
    pub async fn fetch_newest_mentee(&self) -> Result<OnboardingDocument, ProfileSourceError> {
        let json = self.get_json(&self.url("users/newest")).await?;

        serde_json::from_value(json).map_err(|e| {
            ProfileSourceError::InvalidResponse(format!("Failed to parse onboarding document: {}", e))
        })
    }
}
