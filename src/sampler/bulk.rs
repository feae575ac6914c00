use log::debug;
use serde::Serialize;

use super::plan::SamplePlan;
use crate::modbus::client::ModbusClientTrait;
use crate::registers::{DecodedValue, RegisterDictionary, RegisterMeta};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleValue {
    pub address: u16,
    pub name: String,
    pub units: String,
    pub raw: u16,
    pub value: DecodedValue,
}

/// One decoded reading per requested address, in plan order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct SampleRow {
    values: Vec<SampleValue>,
}

impl SampleRow {
    pub fn values(&self) -> &[SampleValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<SampleValue> {
        self.values
    }
}

impl From<Vec<SampleValue>> for SampleRow {
    fn from(values: Vec<SampleValue>) -> Self {
        Self { values }
    }
}

/// Column labels (`"name (units)"`) in the same order `sample` fills a row.
pub fn header(dictionary: &RegisterDictionary, plan: &SamplePlan) -> Result<Vec<String>, ModbusError> {
    resolve(dictionary, plan).map(|metas| metas.iter().map(|meta| meta.label()).collect())
}

/// Reads the plan's range in one transaction and each sparse address in
/// its own, then decodes everything into one row.
///
/// Any failed read fails the whole sample; no partial row is produced.
pub async fn sample<C>(
    client: &mut C,
    dictionary: &RegisterDictionary,
    slave_id: u8,
    plan: &SamplePlan,
) -> Result<SampleRow, ModbusError>
where
    C: ModbusClientTrait + ?Sized,
{
    // Resolve labels before touching the bus, so a dictionary gap costs no I/O.
    let metas = resolve(dictionary, plan)?;

    let mut raw = Vec::with_capacity(plan.len());
    if plan.range_count() > 0 {
        let values = client
            .read_holding_registers(slave_id, plan.range_start(), plan.range_count())
            .await?;
        raw.extend(values);
    }
    for &address in plan.sparse() {
        let values = client.read_holding_registers(slave_id, address, 1).await?;
        raw.extend(values);
    }

    if raw.len() != metas.len() {
        return Err(ModbusError::MalformedResponse(format!(
            "sample returned {} values for {} registers",
            raw.len(),
            metas.len()
        )));
    }

    let values: Vec<SampleValue> = metas
        .into_iter()
        .zip(raw)
        .map(|(meta, raw)| SampleValue {
            address: meta.address,
            name: meta.name.clone(),
            units: meta.units.clone(),
            raw,
            value: meta.decode(raw),
        })
        .collect();

    debug!("📊 Sampled {} registers from device {}", values.len(), slave_id);
    Ok(SampleRow { values })
}

fn resolve<'a>(
    dictionary: &'a RegisterDictionary,
    plan: &SamplePlan,
) -> Result<Vec<&'a RegisterMeta>, ModbusError> {
    plan.addresses()
        .into_iter()
        .map(|address| dictionary.lookup(address))
        .collect()
}

/// A sample plan bound to one slave device.
#[derive(Debug, Clone)]
pub struct BulkSampler {
    slave_id: u8,
    plan: SamplePlan,
}

impl BulkSampler {
    pub fn new(slave_id: u8, plan: SamplePlan) -> Self {
        Self { slave_id, plan }
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn plan(&self) -> &SamplePlan {
        &self.plan
    }

    pub fn header(&self, dictionary: &RegisterDictionary) -> Result<Vec<String>, ModbusError> {
        header(dictionary, &self.plan)
    }

    pub async fn sample<C>(&self, client: &mut C, dictionary: &RegisterDictionary) -> Result<SampleRow, ModbusError>
    where
        C: ModbusClientTrait + ?Sized,
    {
        sample(client, dictionary, self.slave_id, &self.plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::client::{ClientConfig, ModbusClient, RetryPolicy};
    use crate::modbus::test_support::{exception_response, read_response, MockTransport};
    use crate::registers::Scale;
    use std::time::Duration;

    fn battery_dictionary() -> RegisterDictionary {
        RegisterDictionary::from_registers(vec![
            RegisterMeta::new(258, "Battery Voltage", Scale::Factor(0.1), "V"),
            RegisterMeta::new(259, "Battery Current", Scale::Factor(0.1), "A"),
            RegisterMeta::new(277, "Temp", Scale::Factor(1.0), "C"),
            RegisterMeta::new(334, "Throttle", Scale::Factor(0.01), "%"),
        ])
        .unwrap()
    }

    fn client(mock: &MockTransport) -> ModbusClient<MockTransport> {
        ModbusClient::new(
            mock.clone(),
            ClientConfig {
                response_timeout: Duration::from_millis(10),
                retry: RetryPolicy::new(3, Duration::ZERO),
            },
        )
    }

    #[tokio::test]
    async fn test_sample_range_and_sparse() {
        let mock = MockTransport::new();
        mock.push_response(read_response(1, &[1205, 83]));
        mock.push_response(read_response(1, &[42]));
        let mut client = client(&mock);
        let dictionary = battery_dictionary();
        let plan = SamplePlan::new(258, 2, vec![277]).unwrap();

        let row = sample(&mut client, &dictionary, 1, &plan).await.unwrap();
        let decoded: Vec<(&str, &str, DecodedValue)> = row
            .iter()
            .map(|v| (v.name.as_str(), v.units.as_str(), v.value.clone()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                ("Battery Voltage", "V", DecodedValue::Number(120.5)),
                ("Battery Current", "A", DecodedValue::Number(8.3)),
                ("Temp", "C", DecodedValue::Integer(42)),
            ]
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0][2..6], [0x01, 0x02, 0x00, 0x02]);
        assert_eq!(requests[1][2..6], [0x01, 0x15, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_header_aligns_with_row() {
        let mock = MockTransport::new();
        mock.push_response(read_response(1, &[1, 2]));
        mock.push_response(read_response(1, &[3]));
        mock.push_response(read_response(1, &[4]));
        let mut client = client(&mock);
        let dictionary = battery_dictionary();
        let sampler = BulkSampler::new(1, SamplePlan::new(258, 2, vec![334, 277]).unwrap());

        let header = sampler.header(&dictionary).unwrap();
        let row = sampler.sample(&mut client, &dictionary).await.unwrap();

        assert_eq!(header.len(), row.len());
        for (label, value) in header.iter().zip(row.iter()) {
            assert_eq!(label, &dictionary.lookup(value.address).unwrap().label());
        }
        assert_eq!(
            header,
            vec![
                "Battery Voltage (V)",
                "Battery Current (A)",
                "Throttle (%)",
                "Temp (C)"
            ]
        );
        assert_eq!(row.values()[2].raw, 3);
        assert_eq!(row.values()[3].raw, 4);
    }

    #[tokio::test]
    async fn test_sparse_failure_discards_row() {
        let mock = MockTransport::new();
        mock.push_response(read_response(1, &[1205, 83]));
        mock.push_response(exception_response(1, 0x02));
        let mut client = client(&mock);
        let dictionary = battery_dictionary();
        let plan = SamplePlan::new(258, 2, vec![277]).unwrap();

        let result = sample(&mut client, &dictionary, 1, &plan).await;
        assert!(matches!(result, Err(ModbusError::ProtocolException { .. })));
        assert_eq!(mock.exchange_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_register_issues_no_io() {
        let mock = MockTransport::new();
        let mut client = client(&mock);
        let dictionary = battery_dictionary();
        let plan = SamplePlan::new(258, 2, vec![999]).unwrap();

        let result = sample(&mut client, &dictionary, 1, &plan).await;
        assert!(matches!(result, Err(ModbusError::UnknownRegister(999))));
        assert_eq!(mock.exchange_count(), 0);
        assert!(matches!(header(&dictionary, &plan), Err(ModbusError::UnknownRegister(999))));
    }

    #[tokio::test]
    async fn test_sparse_only_plan() {
        let mock = MockTransport::new();
        mock.push_response(read_response(1, &[42]));
        let mut client = client(&mock);
        let dictionary = battery_dictionary();
        let plan = SamplePlan::new(0, 0, vec![277]).unwrap();

        let row = sample(&mut client, &dictionary, 1, &plan).await.unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.values()[0].value, DecodedValue::Integer(42));
        assert_eq!(mock.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_slave_is_rejected_before_io() {
        let mock = MockTransport::new();
        let mut client = client(&mock);
        let dictionary = battery_dictionary();
        let plan = SamplePlan::new(258, 2, vec![277]).unwrap();

        let result = sample(&mut client, &dictionary, 0, &plan).await;
        assert!(matches!(result, Err(ModbusError::InvalidArgument(_))));
        assert_eq!(mock.exchange_count(), 0);
    }

    #[tokio::test]
    async fn test_sample_through_trait_object() {
        let mock = MockTransport::new();
        mock.push_response(read_response(1, &[1205, 83]));
        let mut client = client(&mock);
        let client: &mut dyn ModbusClientTrait = &mut client;
        let dictionary = battery_dictionary();
        let plan = SamplePlan::new(258, 2, vec![]).unwrap();

        let row = sample(client, &dictionary, 1, &plan).await.unwrap();
        assert_eq!(row.values()[0].value.to_string(), "120.5");
        assert_eq!(row.values()[1].value.to_string(), "8.3");
    }
}
