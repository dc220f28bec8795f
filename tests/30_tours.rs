mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{doc_id, tour_body};

async fn names(server: &common::TestServer, path: &str) -> Result<Vec<String>> {
    let res = server.get(path, None).await?;
    assert_eq!(res.status(), StatusCode::OK, "GET {}", path);
    let body: Value = res.json().await?;
    Ok(body["data"]["doc"]
        .as_array()
        .map(|docs| docs.iter().filter_map(|d| d["name"].as_str().map(str::to_string)).collect())
        .unwrap_or_default())
}

/// Three public tours and one secret one.
async fn seed(server: &common::TestServer) -> Result<String> {
    let (token, _) = server.user_with_role("lead-guide").await?;
    server.create_tour(&token, tour_body("The Forest Hiker", 397.0, "easy")).await?;
    server.create_tour(&token, tour_body("The Sea Explorer", 497.0, "medium")).await?;
    server.create_tour(&token, tour_body("The Snow Adventurer", 997.0, "difficult")).await?;
    let mut secret = tour_body("The Secret Hideout", 50.0, "easy");
    secret["secretTour"] = json!(true);
    server.create_tour(&token, secret).await?;
    Ok(token)
}

#[tokio::test]
async fn list_is_public_and_hides_secret_tours() -> Result<()> {
    let server = common::spawn_server().await?;
    seed(&server).await?;

    let res = server.get("/api/v1/tours", None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "success");
    assert_eq!(body["results"], 3);
    let docs = body["data"]["doc"].as_array().cloned().unwrap_or_default();
    assert!(docs.iter().all(|d| d["name"] != "The Secret Hideout"));
    assert!(docs.iter().all(|d| d.get("version").is_none()));
    assert_eq!(docs[0]["durationWeeks"], 1.0);

    let secret: Vec<String> = names(&server, "/api/v1/tours?secretTour=true").await?;
    assert!(secret.is_empty());
    Ok(())
}

#[tokio::test]
async fn filters_sort_project_and_paginate() -> Result<()> {
    let server = common::spawn_server().await?;
    seed(&server).await?;

    let cheap = names(&server, "/api/v1/tours?price[lt]=500&sort=price").await?;
    assert_eq!(cheap, vec!["The Forest Hiker", "The Sea Explorer"]);

    let range = names(&server, "/api/v1/tours?price[gte]=400&price[lte]=1000&sort=-price").await?;
    assert_eq!(range, vec!["The Snow Adventurer", "The Sea Explorer"]);

    let page = names(&server, "/api/v1/tours?sort=price&limit=1&page=2").await?;
    assert_eq!(page, vec!["The Sea Explorer"]);

    let bad_window = names(&server, "/api/v1/tours?limit=abc&page=-1").await?;
    assert_eq!(bad_window.len(), 3);

    let res = server.get("/api/v1/tours?fields=name,price", None).await?;
    let body: Value = res.json().await?;
    let first = body["data"]["doc"][0].as_object().cloned().unwrap_or_default();
    let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["id", "name", "price"]);

    let res = server.get("/api/v1/tours?fields=-summary,-description", None).await?;
    let body: Value = res.json().await?;
    assert!(body["data"]["doc"][0].get("summary").is_none());
    assert!(body["data"]["doc"][0].get("name").is_some());
    Ok(())
}

#[tokio::test]
async fn later_sort_keys_break_ties() -> Result<()> {
    let server = common::spawn_server().await?;
    let (token, _) = server.user_with_role("lead-guide").await?;
    server.create_tour(&token, tour_body("The Wine Taster", 1997.0, "easy")).await?;
    server.create_tour(&token, tour_body("The Park Camper", 1497.0, "medium")).await?;
    server.create_tour(&token, tour_body("The City Wanderer", 1497.0, "easy")).await?;
    server.create_tour(&token, tour_body("The Northern Lights", 1497.0, "easy")).await?;

    let sorted = names(&server, "/api/v1/tours?sort=-price,name").await?;
    assert_eq!(
        sorted,
        vec!["The Wine Taster", "The City Wanderer", "The Northern Lights", "The Park Camper"]
    );

    let reversed = names(&server, "/api/v1/tours?sort=price,-name").await?;
    assert_eq!(
        reversed,
        vec!["The Park Camper", "The Northern Lights", "The City Wanderer", "The Wine Taster"]
    );
    Ok(())
}

#[tokio::test]
async fn repeated_parameters_follow_the_whitelist() -> Result<()> {
    let server = common::spawn_server().await?;
    seed(&server).await?;

    // Not whitelisted: the last value wins.
    let sorted = names(&server, "/api/v1/tours?sort=-price&sort=price").await?;
    assert_eq!(sorted[0], "The Forest Hiker");

    // Whitelisted: every value counts.
    let mut either = names(&server, "/api/v1/tours?difficulty=easy&difficulty=difficult").await?;
    either.sort();
    assert_eq!(either, vec!["The Forest Hiker", "The Snow Adventurer"]);
    Ok(())
}

#[tokio::test]
async fn unknown_or_injected_fields_are_rejected() -> Result<()> {
    let server = common::spawn_server().await?;
    seed(&server).await?;

    for path in ["/api/v1/tours?%24where=1", "/api/v1/tours?password=x", "/api/v1/tours?sort=nope"] {
        let res = server.get(path, None).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "GET {}", path);
        let body: Value = res.json().await?;
        assert_eq!(body["status"], "fail");
    }
    Ok(())
}

#[tokio::test]
async fn top_five_cheap_alias() -> Result<()> {
    let server = common::spawn_server().await?;
    seed(&server).await?;

    let res = server.get("/api/v1/tours/top-5-cheap", None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let docs = body["data"]["doc"].as_array().cloned().unwrap_or_default();
    assert_eq!(docs.len(), 3);
    // Equal ratings, so cheapest first.
    assert_eq!(docs[0]["name"], "The Forest Hiker");
    assert!(docs[0].get("summary").is_some());
    assert!(docs[0].get("imageCover").is_none());
    Ok(())
}

#[tokio::test]
async fn writes_need_staff_roles() -> Result<()> {
    let server = common::spawn_server().await?;
    let (user_token, _) = server.user_with_role("user").await?;
    let (guide_token, _) = server.user_with_role("guide").await?;
    let (admin_token, _) = server.user_with_role("admin").await?;

    let res = server.post("/api/v1/tours", None, tour_body("The Park Camper", 1497.0, "medium")).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    for token in [&user_token, &guide_token] {
        let res = server.post("/api/v1/tours", Some(token), tour_body("The Park Camper", 1497.0, "medium")).await?;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: Value = res.json().await?;
        assert_eq!(body["message"], "You do not have permission to perform this action");
    }

    let tour = server.create_tour(&admin_token, tour_body("The Park Camper", 1497.0, "medium")).await?;
    assert_eq!(tour["slug"], "the-park-camper");
    assert_eq!(tour["ratingsAverage"], 4.5);
    assert_eq!(tour["ratingsQuantity"], 0);
    Ok(())
}

#[tokio::test]
async fn tour_crud_lifecycle() -> Result<()> {
    let server = common::spawn_server().await?;
    let (token, _) = server.user_with_role("lead-guide").await?;
    let (_, guide) = server.user_with_role("guide").await?;

    let mut body = tour_body("The Wine Taster", 1997.0, "easy");
    body["guides"] = json!([guide["id"]]);
    let tour = server.create_tour(&token, body).await?;
    let id = doc_id(&tour)?;

    let res = server.get(&format!("/api/v1/tours/{}", id), None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = res.json().await?;
    let doc = &fetched["data"]["doc"];
    assert_eq!(doc["guides"][0]["role"], "guide");
    assert!(doc["guides"][0].get("password").is_none());
    assert_eq!(doc["reviews"], json!([]));

    let res = server
        .patch(&format!("/api/v1/tours/{}", id), Some(&token), json!({"price": 1500, "name": "The Wine Taster Deluxe"}))
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await?;
    assert_eq!(updated["data"]["doc"]["price"], 1500.0);
    assert_eq!(updated["data"]["doc"]["slug"], "the-wine-taster-deluxe");

    let res = server.patch(&format!("/api/v1/tours/{}", id), Some(&token), json!({"difficulty": "extreme"})).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.delete(&format!("/api/v1/tours/{}", id), Some(&token)).await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = server.get(&format!("/api/v1/tours/{}", id), None).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "No document found with that ID");
    Ok(())
}

#[tokio::test]
async fn create_validates_required_fields() -> Result<()> {
    let server = common::spawn_server().await?;
    let (token, _) = server.user_with_role("admin").await?;

    let res = server.post("/api/v1/tours", Some(&token), json!({"name": "Short"})).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["message"].as_str().unwrap_or_default().starts_with("Invalid input data"));
    for field in ["name", "duration", "price", "summary", "imageCover"] {
        assert!(body["fieldErrors"][field].is_string(), "missing error for {}", field);
    }

    let mut discounted = tour_body("The Northern Lights", 1497.0, "easy");
    discounted["priceDiscount"] = json!(2000);
    let res = server.post("/api/v1/tours", Some(&token), discounted).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    server.create_tour(&token, tour_body("The Northern Lights", 1497.0, "easy")).await?;
    let res = server.post("/api/v1/tours", Some(&token), tour_body("The Northern Lights", 99.0, "easy")).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["message"].as_str().unwrap_or_default().starts_with("Duplicate field value: The Northern Lights"));
    Ok(())
}

#[tokio::test]
async fn stats_and_monthly_plan() -> Result<()> {
    let server = common::spawn_server().await?;
    let staff = seed(&server).await?;

    let res = server.get("/api/v1/tours/tour-stats", None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let stats = body["data"]["stats"].as_array().cloned().unwrap_or_default();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0]["difficulty"], "EASY");
    assert_eq!(stats[0]["numTours"], 1);
    assert_eq!(stats[2]["difficulty"], "DIFFICULT");
    assert_eq!(stats[2]["maxPrice"], 997.0);

    let (user_token, _) = server.user_with_role("user").await?;
    let res = server.get("/api/v1/tours/get-monthly-plan/2021", Some(&user_token)).await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (guide_token, _) = server.user_with_role("guide").await?;
    let res = server.get("/api/v1/tours/get-monthly-plan/2021", Some(&guide_token)).await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (admin_token, _) = server.user_with_role("admin").await?;
    let res = server.get("/api/v1/tours/get-monthly-plan/2021", Some(&admin_token)).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.get("/api/v1/tours/get-monthly-plan/2021", Some(&staff)).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let plan = body["data"]["plan"].as_array().cloned().unwrap_or_default();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0]["numTourStarts"], 3);
    assert_eq!(plan[0]["tours"].as_array().map(Vec::len), Some(3));

    let res = server.get("/api/v1/tours/get-monthly-plan/soon", Some(&staff)).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn geospatial_routes() -> Result<()> {
    let server = common::spawn_server().await?;
    let (token, _) = server.user_with_role("admin").await?;
    let mut la = tour_body("The City Wanderer", 1197.0, "easy");
    la["startLocation"] = json!({"type": "Point", "coordinates": [-118.2437, 34.0522]});
    let mut sf = tour_body("The Bay Area Cyclist", 897.0, "easy");
    sf["startLocation"] = json!({"type": "Point", "coordinates": [-122.4194, 37.7749]});
    server.create_tour(&token, la).await?;
    server.create_tour(&token, sf).await?;

    let res = server
        .get("/api/v1/tours/tours-within/100/center/34.05,-118.24/unit/mi", None)
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["results"], 1);
    assert_eq!(body["data"]["data"][0]["name"], "The City Wanderer");

    let res = server.get("/api/v1/tours/distances/34.05,-118.24/unit/km", None).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let distances = body["data"]["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(distances.len(), 2);
    assert_eq!(distances[0]["name"], "The City Wanderer");
    assert!(distances[1]["distance"].as_f64().unwrap_or_default() > 500.0);

    let res = server.get("/api/v1/tours/distances/34.05/unit/km", None).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Please provide latitude and longitude in the format lat,lng.");

    let res = server.get("/api/v1/tours/distances/34.05,-118.24/unit/ft", None).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
