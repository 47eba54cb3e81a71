use assert_fs::prelude::*;
use predicates::prelude::*;

use archflow::config::Config;
use archflow::core::{EdgeLabel, Engine};

const ORDERING: &str = r#"{
  "source": "Shop.Ordering.dll",
  "types": [
    { "id": "Shop.Api.OrderController", "name": "OrderController", "kind": "Controller", "methods": ["Pay"] },
    { "id": "Shop.Ordering.PayOrderCommand", "name": "PayOrderCommand", "kind": "Command" },
    { "id": "Shop.Ordering.NotifyCommand", "name": "NotifyCommand", "kind": "Command" },
    {
      "id": "Shop.Ordering.PayOrderCommandHandler",
      "name": "PayOrderCommandHandler",
      "kind": "CommandHandler",
      "contracts": [{ "HandlesCommand": { "command": "Shop.Ordering.PayOrderCommand" } }]
    },
    {
      "id": "Shop.Ordering.Order",
      "name": "Order",
      "kind": "Aggregate",
      "methods": ["MarkPaid"],
      "members": [
        {
          "name": "Items",
          "type_ref": { "id": "List", "arguments": ["Shop.Ordering.OrderItem"] }
        }
      ]
    },
    { "id": "Shop.Ordering.OrderItem", "name": "OrderItem", "kind": "Entity", "methods": ["Settle"] },
    { "id": "Shop.Ordering.OrderPaidEvent", "name": "OrderPaidEvent", "kind": "DomainEvent" },
    {
      "id": "Shop.Ordering.OrderPaidHandler",
      "name": "OrderPaidHandler",
      "kind": "DomainEventHandler",
      "contracts": [{ "HandlesDomainEvent": { "event": "Shop.Ordering.OrderPaidEvent" } }]
    }
  ],
  "calls": [
    { "source_type": "Shop.Api.OrderController", "source_method": "Pay", "target_type": "Shop.Ordering.PayOrderCommand", "call_kind": "SendCommand" },
    { "source_type": "Shop.Ordering.PayOrderCommandHandler", "source_method": "Handle", "target_type": "Shop.Ordering.Order", "target_method": "MarkPaid", "call_kind": "Invocation" },
    { "source_type": "Shop.Ordering.Order", "source_method": "MarkPaid", "target_type": "Shop.Ordering.OrderPaidEvent", "call_kind": "RaiseDomainEvent" },
    { "source_type": "Shop.Ordering.OrderPaidHandler", "source_method": "Handle", "target_type": "Shop.Ordering.NotifyCommand", "call_kind": "SendCommand" },
    { "source_type": "Shop.Ordering.OrderPaidHandler", "source_method": "Handle", "target_type": "Shop.Missing.Type", "call_kind": "SendCommand" }
  ]
}"#;

fn engine() -> Engine {
    let mut config = Config::default();
    config.project.name = "Shop".to_string();
    Engine::with_config(config)
}

#[tokio::test]
async fn test_analyze_writes_graph_and_chain_outputs() {
    let temp = assert_fs::TempDir::new().unwrap();
    let facts = temp.child("facts");
    facts.child("ordering.json").write_str(ORDERING).unwrap();
    let output = temp.child("out");

    let written = engine()
        .analyze(vec![facts.to_path_buf()], Some(output.to_path_buf()), Some("all".to_string()))
        .await
        .unwrap();

    assert_eq!(written.len(), 3);
    output.child("graph.json").assert(predicate::path::exists());
    output
        .child("graph.json")
        .assert(predicate::str::contains(r#""Shop.Ordering.OrderItem": "Shop.Ordering.Order""#));
    output
        .child("chains.json")
        .assert(predicate::str::contains(r#""node_id": "Shop.Ordering.NotifyCommand""#));
    output
        .child("chains.md")
        .assert(predicate::str::contains("## Shop.Api.OrderController.Pay"))
        .assert(predicate::str::contains("flowchart LR"))
        .assert(predicate::str::contains("N4 -->|sends| N5"));

    temp.close().unwrap();
}

#[tokio::test]
async fn test_chains_follow_the_pay_order_flow() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("ordering.json").write_str(ORDERING).unwrap();

    let chains = engine().chains(vec![temp.to_path_buf()], None).await.unwrap();

    assert_eq!(chains.len(), 1);
    assert_eq!(
        chains[0].node_ids().collect::<Vec<_>>(),
        vec![
            "Shop.Api.OrderController.Pay",
            "Shop.Ordering.PayOrderCommand",
            "Shop.Ordering.Order.MarkPaid",
            "Shop.Ordering.OrderPaidEvent",
            "Shop.Ordering.OrderPaidHandler",
            "Shop.Ordering.NotifyCommand",
        ]
    );
    assert_eq!(
        chains[0].labels(),
        vec![
            EdgeLabel::Sends,
            EdgeLabel::Execute,
            EdgeLabel::Publishes,
            EdgeLabel::Handles,
            EdgeLabel::Sends,
        ]
    );
}

#[tokio::test]
async fn test_reloading_the_same_batch_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("a/ordering.json").write_str(ORDERING).unwrap();
    temp.child("b/ordering.json").write_str(ORDERING).unwrap();

    let once = engine()
        .build_store(&[temp.child("a").to_path_buf()])
        .await
        .unwrap();
    let twice = engine().build_store(&[temp.to_path_buf()]).await.unwrap();

    assert_eq!(once.store, twice.store);
    assert_eq!(once.malformed_facts(), 1);
    assert_eq!(twice.reports.len(), 2);
}
