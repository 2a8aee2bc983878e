use adc_declaration::declaration::{DigestContext, MAX_PATH_LENGTH, REDACTED};
use adc_declaration::tags::TagKind;
use adc_declaration::{AdcError, AdcParser, DeviceProfile, DigestOptions};
use proptest::prelude::*;
use serde_json::{json, Value};

use crate::support::{
    certificate_declaration, discovery_declaration, encrypted_secret, http_service_declaration,
    RecordingProcessor, StubProcessors, ENCRYPTED_CIPHERTEXT,
};

async fn digest(
    stubs: &StubProcessors,
    device: DeviceProfile,
    declaration: &mut Value,
) -> Result<adc_declaration::DigestOutcome, AdcError> {
    stubs
        .parser(DeviceProfile::Primary)
        .digest(
            &DigestContext::new(),
            declaration,
            DigestOptions { target_device: Some(device), ..Default::default() },
        )
        .await
}

fn has_error(err: &AdcError, needle: &str) -> bool {
    err.validation_errors()
        .is_some_and(|errors| errors.iter().any(|e| e.message.contains(needle)))
}

#[tokio::test]
async fn test_empty_declaration_lacks_id() {
    let stubs = StubProcessors::recording();
    for mut declaration in [json!({}), json!({"id": "id"})] {
        let err = digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap_err();
        assert!(has_error(&err, "lacks valid 'id'"), "unexpected error: {}", err);
    }
}

#[tokio::test]
async fn test_bad_tenant_name() {
    let stubs = StubProcessors::recording();
    let mut declaration = json!({
        "id": "id",
        "scratch": "scratch",
        "f5*com": {"class": "Tenant"}
    });
    let err = digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap_err();
    assert!(has_error(&err, "\"f5*com\" should match pattern"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_digest_rejects_long_paths() {
    let stubs = StubProcessors::recording();
    let tenant = format!("Tenant{}", "t".repeat(90));
    let app = format!("Application{}", "a".repeat(90));
    let service = format!("Service{}", "s".repeat(90));
    let mut declaration = json!({
        "id": "testPathLength",
        "class": "ADC",
        "schemaVersion": "3.0.0",
        tenant.clone(): {
            "class": "Tenant",
            app.clone(): {
                "class": "Application",
                service.clone(): {
                    "class": "Service_HTTP",
                    "virtualAddresses": ["198.200.198.200"]
                }
            }
        }
    });

    let err = digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap_err();
    assert!(matches!(err, AdcError::PathLength { .. }));
    assert!(err.to_string().contains("exceeds the 255 full path character limit"));
}

#[test]
fn test_validate_path_length_standalone() {
    let parser = StubProcessors::recording().parser(DeviceProfile::Primary);
    let declaration = json!({
        "id": "id",
        "ThisIsTheTenantForThePathThatWillDefinitelyExceedTheCharacterLimitWhichIsTwoHundredFiftyFive": {
            "class": "Tenant",
            "NowTheApplicationWillHelpMakeThePathLongerSoThatItWillExceedTheLimitOfCharacters": {
                "class": "Application",
                "AndFinallyWeArriveToAnItemThatWillAlsoBeInThePathSoWeJustNeedSomeMoreCharactersToFinishGettingThere": {}
            }
        }
    });
    let err = parser.validate_path_length(&declaration).unwrap_err();
    assert!(err.to_string().contains("exceeds the 255 full path character limit"));
    assert!(parser.validate_path_length(&http_service_declaration("short")).is_ok());
}

#[tokio::test]
async fn test_default_parser_digests_single_service() {
    let parser = AdcParser::new(DeviceProfile::Primary).unwrap();
    let mut declaration = json!({
        "class": "ADC",
        "schemaVersion": "3.0.0",
        "id": "decl",
        "tenant": {
            "class": "Tenant",
            "app": {
                "class": "Application",
                "template": "http",
                "serviceMain": {
                    "class": "Service_HTTP",
                    "virtualAddresses": ["198.51.100.10"]
                }
            }
        }
    });

    let outcome = parser
        .digest(&DigestContext::new(), &mut declaration, DigestOptions::default())
        .await
        .unwrap();

    assert!(outcome.defaults_applied > 0);
    assert_eq!(declaration["tenant"]["app"]["serviceMain"]["virtualPort"], json!(80));

    let mut identity_only = json!({"class": "ADC", "schemaVersion": "3.0.0", "id": "decl"});
    let err = parser
        .digest(&DigestContext::new(), &mut identity_only, DigestOptions::default())
        .await
        .unwrap_err();
    assert!(has_error(&err, "lacks valid 'id'"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_redacts_aws_credentials() {
    let stubs = StubProcessors::recording();
    let mut declaration = discovery_declaration(
        "redactAWS",
        json!({
            "servicePort": 80,
            "addressDiscovery": "aws",
            "updateInterval": 1,
            "tagKey": "foo",
            "tagValue": "bar",
            "addressRealm": "private",
            "region": "us-west-2-lax-1",
            "accessKeyId": "xxxxx",
            "secretAccessKey": "xxxxx",
            "credentialUpdate": false
        }),
    );
    let mut base = declaration.clone();

    let outcome = stubs
        .parser(DeviceProfile::Primary)
        .digest(
            &DigestContext::new(),
            &mut declaration,
            DigestOptions { copy_secrets: true, base_declaration: Some(&mut base), ..Default::default() },
        )
        .await
        .unwrap();

    let member = &declaration["tenant"]["app"]["webpool"]["members"][0];
    assert_eq!(member["accessKeyId"], json!(REDACTED));
    assert_eq!(member["secretAccessKey"], json!(REDACTED));
    assert_eq!(member["tagKey"], json!("foo"));
    assert_eq!(base["tenant"]["app"]["webpool"]["members"][0]["accessKeyId"], json!(REDACTED));
    assert_eq!(outcome.redacted_fields, 4);
}

#[tokio::test]
async fn test_redacts_azure_credentials() {
    let stubs = StubProcessors::recording();
    let mut declaration = discovery_declaration(
        "redactAzure",
        json!({
            "servicePort": 80,
            "addressDiscovery": "azure",
            "updateInterval": 1,
            "tagKey": "foo",
            "tagValue": "bar",
            "apiAccessKey": "xxxxx",
            "resourceGroup": "xxxxx",
            "subscriptionId": "xxxxx",
            "directoryId": "xxxxx",
            "applicationId": "xxxxx"
        }),
    );

    digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap();

    let member = &declaration["tenant"]["app"]["webpool"]["members"][0];
    for field in ["apiAccessKey", "resourceGroup", "subscriptionId", "directoryId", "applicationId"] {
        assert_eq!(member[field], json!(REDACTED), "{} was not redacted", field);
    }
}

#[tokio::test]
async fn test_redacts_even_when_validation_fails() {
    let stubs = StubProcessors::recording();
    let mut declaration = json!({
        "id": "broken",
        "tenant": {"class": "Tenant", "app": {"class": "Application",
            "pool": {"class": "Pool", "members": [{
                "servicePort": 80,
                "addressDiscovery": "aws",
                "accessKeyId": "xxxxx"
            }]}
        }}
    });

    assert!(digest(&stubs, DeviceProfile::Primary, &mut declaration).await.is_err());
    assert_eq!(declaration["tenant"]["app"]["pool"]["members"][0]["accessKeyId"], json!(REDACTED));
}

#[tokio::test]
async fn test_expands_defaults_on_primary() {
    let stubs = StubProcessors::recording();
    let original = http_service_declaration("testBIGIP");
    let mut declaration = original.clone();

    let outcome = digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap();

    assert_ne!(declaration, original);
    assert_eq!(declaration["id"], original["id"]);
    assert_eq!(declaration["testTenant"]["app"]["enable"], json!(true));
    assert_eq!(declaration["testTenant"]["enable"], json!(true));
    assert_eq!(declaration["updateMode"], json!("selective"));
    assert!(outcome.defaults_applied > 0);
}

#[tokio::test]
async fn test_secondary_still_validates() {
    let stubs = StubProcessors::recording();
    let mut declaration = json!({"id": "id", "tenant": {"class": "Tenant"}});
    let err = digest(&stubs, DeviceProfile::Secondary, &mut declaration).await.unwrap_err();
    assert!(has_error(&err, "should have required property 'class'"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_secondary_still_dispatches_secrets() {
    let stubs = StubProcessors::recording();
    let mut declaration = certificate_declaration("testBIGIQ-encrypt");

    digest(&stubs, DeviceProfile::Secondary, &mut declaration).await.unwrap();

    let seen = stubs.secret.seen();
    assert!(seen.iter().any(|occurrence| occurrence.data["ciphertext"] == json!("mumblemumble")));
}

#[tokio::test]
async fn test_secondary_leaves_declaration_unchanged() {
    let stubs = StubProcessors::recording();
    let mut declaration = json!({
        "id": "testBIGIQ-expand",
        "class": "ADC",
        "schemaVersion": "3.0.0",
        "target": {"address": "1.1.1.1"},
        "testTenant": {
            "class": "Tenant",
            "app": {
                "class": "Application",
                "template": "http",
                "serviceMain": {
                    "class": "Service_HTTP",
                    "virtualAddresses": ["198.100.198.100"]
                }
            }
        }
    });
    let original = declaration.clone();

    let outcome = digest(&stubs, DeviceProfile::Secondary, &mut declaration).await.unwrap();

    assert_eq!(declaration, original);
    assert_eq!(outcome.defaults_applied, 0);
}

#[tokio::test]
async fn test_copies_secrets_to_base() {
    let stubs = StubProcessors::new(
        RecordingProcessor::replacing(encrypted_secret()),
        RecordingProcessor::replacing(json!(ENCRYPTED_CIPHERTEXT)),
    );

    let mut base = certificate_declaration("testBIGIQ-encrypt");
    base["testTenant"]["app"]["monitor1"] = json!({
        "class": "Monitor",
        "monitorType": "external",
        "script": {
            "url": {
                "url": "https://www.example.com",
                "authentication": {"method": "bearer-token", "token": "foo"}
            }
        }
    });
    let mut declaration = base.clone();

    let mut expected = base.clone();
    expected["testTenant"]["app"]["webcert1"]["passphrase"] = encrypted_secret();
    expected["testTenant"]["app"]["monitor1"]["script"]["url"]["authentication"]["token"] =
        json!(ENCRYPTED_CIPHERTEXT);

    stubs
        .parser(DeviceProfile::Primary)
        .digest(
            &DigestContext::new(),
            &mut declaration,
            DigestOptions { copy_secrets: true, base_declaration: Some(&mut base), ..Default::default() },
        )
        .await
        .unwrap();

    assert_eq!(base, expected);
    assert_eq!(stubs.fetch.seen().len(), 1);
    assert_eq!(
        declaration["testTenant"]["app"]["webcert1"]["passphrase"],
        encrypted_secret()
    );
}

#[tokio::test]
async fn test_copy_secrets_requires_base() {
    let stubs = StubProcessors::recording();
    let mut declaration = http_service_declaration("noBase");
    let err = stubs
        .parser(DeviceProfile::Primary)
        .digest(
            &DigestContext::new(),
            &mut declaration,
            DigestOptions { copy_secrets: true, ..Default::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdcError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_failed_secret_keeps_other_mutations() {
    let stubs = StubProcessors::new(
        RecordingProcessor::replacing(encrypted_secret())
            .rejecting("/testTenant/app/webcert2/passphrase"),
        RecordingProcessor::default(),
    );
    let mut declaration = certificate_declaration("failedSecret");
    let app = &mut declaration["testTenant"]["app"];
    app["webcert2"] = app["webcert1"].clone();
    app["webpool"] = json!({
        "class": "Pool",
        "members": [{
            "servicePort": 80,
            "addressDiscovery": "aws",
            "region": "us-west-2",
            "accessKeyId": "xxxxx",
            "secretAccessKey": "xxxxx"
        }]
    });
    let untouched = declaration["testTenant"]["app"]["webcert2"]["passphrase"].clone();

    let err = digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap_err();

    assert!(
        matches!(err, AdcError::TagProcessing { kind: TagKind::Secret, .. }),
        "unexpected error: {}",
        err
    );
    assert!(err.to_string().contains("webcert2"));
    let app = &declaration["testTenant"]["app"];
    assert_eq!(app["webcert1"]["passphrase"], encrypted_secret());
    assert_eq!(app["webcert2"]["passphrase"], untouched);
    assert_eq!(app["webpool"]["members"][0]["accessKeyId"], json!(REDACTED));
    assert_eq!(app["webpool"]["members"][0]["secretAccessKey"], json!(REDACTED));
    assert_eq!(stubs.secret.seen().len(), 2);
}

#[tokio::test]
async fn test_lenient_validation_reports_errors() {
    let stubs = StubProcessors::recording();
    let mut declaration = json!({"id": "id", "tenant": {"class": "Tenant"}});
    let original = declaration.clone();

    let outcome = stubs
        .parser(DeviceProfile::Primary)
        .digest(
            &DigestContext::new().with_strict_validation(false),
            &mut declaration,
            DigestOptions::default(),
        )
        .await
        .unwrap();

    assert!(!outcome.is_valid());
    assert!(outcome
        .validation_errors
        .iter()
        .any(|e| e.message == "should have required property 'class'"));
    assert_eq!(declaration, original);
}

#[tokio::test]
async fn test_self_signed_conflicts_are_reported() {
    let stubs = StubProcessors::recording();
    let mut declaration = certificate_declaration("conflicts");
    let cert = &mut declaration["testTenant"]["app"]["webcert1"];
    cert["certificate"] = json!(crate::fixtures::SELF_SIGNED_CERT);
    cert["issuerCertificate"] = json!({"bigip": "/Common/issuer"});

    let outcome = digest(&stubs, DeviceProfile::Primary, &mut declaration).await.unwrap();

    assert_eq!(outcome.certificate_conflicts.len(), 1);
    assert_eq!(outcome.certificate_conflicts[0].path.to_string(), "/testTenant/app/webcert1");
    assert_eq!(stubs.big_component.seen().len(), 1);
}

fn tenant_name(length: usize) -> String {
    format!("T{}", "x".repeat(length.saturating_sub(1)))
}

proptest! {
    #[test]
    fn prop_path_length_bound(tenant in 1usize..150, app in 1usize..150, item in 1usize..150) {
        let parser = StubProcessors::recording().parser(DeviceProfile::Primary);
        let declaration = json!({
            "id": "len",
            tenant_name(tenant): {
                "class": "Tenant",
                tenant_name(app): {"class": "Application", tenant_name(item): {}}
            }
        });
        let full = tenant + app + item + 3;
        let result = parser.validate_path_length(&declaration);
        prop_assert_eq!(result.is_ok(), full <= MAX_PATH_LENGTH);
    }
}
