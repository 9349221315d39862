/// Script injected into every page before its own scripts run. It installs
/// `window.paca` (aliased as `window.ic.paca`) with the same behaviour as
/// [`crate::provider::Provider`]: one continuation per request id, session
/// state changed only through `__receive`.
pub const PROVIDER_BOOTSTRAP: &str = r#"(function () {
  if (window.paca && window.paca.__installed) { return; }

  function post(message) {
    var raw = JSON.stringify(message);
    if (window.ReactNativeWebView) {
      window.ReactNativeWebView.postMessage(raw);
    } else if (window.ipc && window.ipc.postMessage) {
      window.ipc.postMessage(raw);
    } else if (window.webkit && window.webkit.messageHandlers && window.webkit.messageHandlers.paca) {
      window.webkit.messageHandlers.paca.postMessage(raw);
    }
  }

  var session = { connected: false, principal: null };
  var pending = {};
  var counter = 0;

  function setSession(connected, principal) {
    session = connected && principal ? { connected: true, principal: principal }
                                     : { connected: false, principal: null };
  }

  function failurePayload(slot) {
    switch (slot) {
      case 'connect': return { connected: false, message: 'Connection failed' };
      case 'balance': return '0';
      case 'confirm': return { value: false };
      case 'prompt': return { value: null };
      default: return { success: false, message: 'Request failed' };
    }
  }

  function request(type, slot, data) {
    return new Promise(function (resolve) {
      counter += 1;
      var id = 'paca-' + Date.now().toString(36) + '-' + counter;
      pending[id] = { slot: slot, resolve: resolve };
      var message = { type: type, source: 'paca', id: id };
      if (data) { message.data = data; }
      post(message);
    });
  }

  function requireConnected() {
    if (!session.connected) { throw new Error('Wallet not connected'); }
  }

  var paca = {
    __installed: true,
    get isConnected() { return session.connected; },
    get principal() { return session.principal; },

    requestConnect: function () {
      return request('CONNECT_WALLET', 'connect');
    },
    disconnect: function () {
      setSession(false, null);
      post({ type: 'DISCONNECT_WALLET', source: 'paca' });
      return true;
    },
    getPrincipal: function () {
      requireConnected();
      return session.principal;
    },
    getBalance: function () {
      requireConnected();
      return request('GET_BALANCE', 'balance');
    },
    requestTransfer: function (recipient, amount) {
      requireConnected();
      return request('REQUEST_TRANSFER', 'transfer', { recipient: recipient, amount: String(amount) });
    },
    requestSignMessage: function (message) {
      requireConnected();
      return request('REQUEST_SIGN', 'sign', { message: message });
    },

    __receive: function (injection) {
      if (injection.op === 'resolve') {
        var call = pending[injection.id];
        if (!call) { return; }
        delete pending[injection.id];
        if (call.slot === 'connect') {
          setSession(!!injection.result.connected, injection.result.principal);
        }
        call.resolve(injection.result);
      } else if (injection.op === 'session') {
        setSession(injection.connected, injection.principal);
      } else if (injection.op === 'fail_all') {
        setSession(false, null);
        var ids = Object.keys(pending);
        for (var i = 0; i < ids.length; i++) {
          var outstanding = pending[ids[i]];
          delete pending[ids[i]];
          outstanding.resolve(failurePayload(outstanding.slot));
        }
      }
    }
  };

  window.alert = function (message) {
    post({ type: 'ALERT', source: 'paca', data: { message: String(message) } });
  };
  window.pacaConfirm = function (message) {
    return request('CONFIRM', 'confirm', { message: String(message) })
      .then(function (result) { return result.value; });
  };
  window.pacaPrompt = function (message) {
    return request('PROMPT', 'prompt', { message: String(message) })
      .then(function (result) { return result.value; });
  };

  window.paca = paca;
  if (window.ic === undefined) { window.ic = {}; }
  window.ic.paca = paca;
})();
true;
"#;
